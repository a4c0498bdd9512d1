use logwarden_core::StatusClass;
use serde::Serialize;

/// Per-class request counts for one report window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    /// Every recorded request, including statuses outside 200-599.
    pub total: u64,
    pub class_2xx: u64,
    pub class_3xx: u64,
    pub class_4xx: u64,
    pub class_5xx: u64,
}

impl ReportSummary {
    pub fn from_statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
        let mut summary = Self::default();
        for status in statuses {
            summary.add(status);
        }
        summary
    }

    pub fn add(&mut self, status: u16) {
        self.total += 1;
        match StatusClass::of(status) {
            StatusClass::Success => self.class_2xx += 1,
            StatusClass::Redirect => self.class_3xx += 1,
            StatusClass::ClientError => self.class_4xx += 1,
            StatusClass::ServerError => self.class_5xx += 1,
            StatusClass::Other => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
