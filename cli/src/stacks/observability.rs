use chronas_common::dashboard::Dashboard;
use chronas_common::{App, Stack, StackId, StackProps};

/// Owner of the shared dashboard other stacks contribute widgets to
pub(crate) struct CloudwatchStack {
    pub(crate) id: StackId,
    pub(crate) dashboard: Dashboard,
}

impl CloudwatchStack {
    pub(crate) fn new(app: &mut App, name: &str, props: StackProps) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);
        let dashboard = Dashboard::new(&mut stack, "ChronasDashboard", "ChronasDashboard");

        Ok(Self {
            id: app.add_stack(stack)?,
            dashboard,
        })
    }
}
