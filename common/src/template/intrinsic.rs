use serde_json::{json, Map, Value};

pub const ACCOUNT_ID: &str = "AWS::AccountId";
pub const PARTITION: &str = "AWS::Partition";
pub const REGION: &str = "AWS::Region";

pub fn reference(name: &str) -> Value {
    json!({ "Ref": name })
}

pub fn get_att(name: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [name, attribute] })
}

pub fn import_value(export: &str) -> Value {
    json!({ "Fn::ImportValue": export })
}

pub fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

pub fn sub_with(template: &str, variables: Map<String, Value>) -> Value {
    json!({ "Fn::Sub": [template, variables] })
}

pub fn join(separator: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [separator, parts] })
}

/// One of the availability zones of the deployment region
pub fn availability_zone(index: usize) -> Value {
    json!({ "Fn::Select": [index, { "Fn::GetAZs": "" }] })
}

/// Secrets Manager dynamic reference, resolved by CloudFormation at deploy time
pub fn secret_reference(secret: Value, json_key: Option<&str>) -> Value {
    let suffix = json_key
        .map(|key| format!(":SecretString:{key}}}}}"))
        .unwrap_or_else(|| "}}".into());

    join("", vec![json!("{{resolve:secretsmanager:"), secret, json!(suffix)])
}

/// Whether a value is resolved by CloudFormation rather than known upfront
pub fn is_intrinsic(value: &Value) -> bool {
    match value.as_object() {
        Some(object) if object.len() == 1 => object
            .keys()
            .all(|key| key == "Ref" || key.starts_with("Fn::")),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_reference_with_key() {
        let value = secret_reference(reference("DatabaseSecret"), Some("password"));

        assert_eq!(
            value,
            json!({"Fn::Join": ["", [
                "{{resolve:secretsmanager:",
                {"Ref": "DatabaseSecret"},
                ":SecretString:password}}"
            ]]})
        );
    }

    #[test]
    fn intrinsic_detection() {
        assert!(is_intrinsic(&import_value("Stack-VpcId")));
        assert!(is_intrinsic(&reference("Vpc")));
        assert!(!is_intrinsic(&json!("vpc-123")));
        assert!(!is_intrinsic(&json!({"Name": "x"})));
    }
}
