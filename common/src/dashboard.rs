use crate::stack::{Output, Stack};
use crate::template::{is_intrinsic, sub_with, CfnResource};
use serde_json::{json, Map, Value};
use std::cell::RefCell;
use std::rc::Rc;

const GRID_WIDTH: u32 = 24;

/// A CloudWatch metric, dimensions may come from other stacks
#[derive(Clone, Debug)]
pub struct Metric {
    namespace: String,
    name: String,
    dimensions: Vec<(String, Output)>,
    statistic: String,
    period: u32,
    label: Option<String>,
}

impl Metric {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            dimensions: vec![],
            statistic: "Average".into(),
            period: 300,
            label: None,
        }
    }

    pub fn dimension(mut self, name: &str, value: &Output) -> Self {
        self.dimensions.push((name.to_string(), value.clone()));
        self
    }

    pub fn statistic(mut self, statistic: &str) -> Self {
        self.statistic = statistic.to_string();
        self
    }

    pub fn period(mut self, seconds: u32) -> Self {
        self.period = seconds;
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }
}

#[derive(Clone, Debug)]
pub struct GraphWidget {
    title: String,
    left: Vec<Metric>,
    width: u32,
    height: u32,
}

impl GraphWidget {
    pub fn new(title: &str, left: Vec<Metric>) -> Self {
        Self {
            title: title.to_string(),
            left,
            width: 6,
            height: 6,
        }
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = width.clamp(1, GRID_WIDTH);
        self
    }
}

/// Rows of widgets, every `add_widgets` call starts a new row
#[derive(Debug, Default)]
struct Layout {
    rows: Vec<Vec<GraphWidget>>,
}

/// Shared CloudWatch dashboard
///
/// The owner stack declares it, other stacks add widgets through cloned handles.
/// The body is rendered when the owner is finalized during synthesis, so every
/// contribution made while composing the app ends up in the template
#[derive(Clone, Debug)]
pub struct Dashboard {
    logical_id: String,
    name: String,
    layout: Rc<RefCell<Layout>>,
}

impl Dashboard {
    pub fn new(stack: &mut Stack, logical_id: &str, name: &str) -> Self {
        let dashboard = Self {
            logical_id: logical_id.to_string(),
            name: name.to_string(),
            layout: Rc::new(RefCell::new(Layout::default())),
        };

        stack.attach_dashboard(dashboard.clone());
        dashboard
    }

    pub fn add_widgets(&self, widgets: Vec<GraphWidget>) {
        if !widgets.is_empty() {
            self.layout.borrow_mut().rows.push(widgets);
        }
    }

    pub fn widget_count(&self) -> usize {
        self.layout.borrow().rows.iter().map(Vec::len).sum()
    }

    /// Dashboard resource with cross-stack dimensions imported into the owner
    pub(crate) fn render(&self, stack: &mut Stack) -> eyre::Result<CfnResource> {
        let mut variables = Map::new();
        let mut widgets = vec![];
        let mut y = 0;

        for row in self.layout.borrow().rows.iter() {
            let mut x = 0;
            let mut row_height = 0;

            for widget in row {
                if x + widget.width > GRID_WIDTH {
                    x = 0;
                    y += row_height;
                    row_height = 0;
                }

                let metrics = widget
                    .left
                    .iter()
                    .map(|metric| render_metric(metric, stack, &mut variables))
                    .collect::<eyre::Result<Vec<_>>>()?;

                widgets.push(json!({
                    "type": "metric",
                    "x": x,
                    "y": y,
                    "width": widget.width,
                    "height": widget.height,
                    "properties": {
                        "view": "timeSeries",
                        "title": escape(&widget.title),
                        "region": "${AWS::Region}",
                        "metrics": metrics,
                        "yAxis": {},
                    },
                }));

                x += widget.width;
                row_height = row_height.max(widget.height);
            }

            y += row_height;
        }

        let body = serde_json::to_string(&json!({ "widgets": widgets }))?;

        Ok(CfnResource::new(
            &self.logical_id,
            json!({
                "Type": "AWS::CloudWatch::Dashboard",
                "Properties": {
                    "DashboardName": self.name,
                    "DashboardBody": sub_with(&body, variables),
                }
            }),
        ))
    }
}

/// Keep literal `${` out of `Fn::Sub` substitution
fn escape(literal: &str) -> String {
    literal.replace("${", "${!")
}

fn render_metric(
    metric: &Metric,
    stack: &mut Stack,
    variables: &mut Map<String, Value>,
) -> eyre::Result<Value> {
    let mut line = vec![json!(metric.namespace), json!(metric.name)];

    for (name, output) in metric.dimensions.iter() {
        let value = stack.resolve(output)?;

        let value = match value {
            Value::String(literal) => escape(&literal),
            value if is_intrinsic(&value) => {
                let token = format!("Token{}", variables.len());
                variables.insert(token.clone(), value);
                format!("${{{token}}}")
            }
            value => eyre::bail!("Dimension {name} of {} has unsupported value {value}", metric.name),
        };

        line.push(json!(name));
        line.push(json!(value));
    }

    let mut options = json!({ "stat": metric.statistic, "period": metric.period });

    if let Some(label) = &metric.label {
        options["label"] = json!(escape(label));
    }

    line.push(options);
    Ok(Value::Array(line))
}
