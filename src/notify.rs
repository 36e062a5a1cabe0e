use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

/// User-facing channel. Warnings are recoverable; errors mean the job was aborted.
pub trait Notifier {
    fn notify(&mut self, notice: Notice);

    fn info(&mut self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.notify(Notice {
            severity: Severity::Info,
            message: message.into(),
        });
    }

    fn warning(&mut self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.notify(Notice {
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    fn error(&mut self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.notify(Notice {
            severity: Severity::Error,
            message: message.into(),
        });
    }
}

/// Collects notices in arrival order and mirrors them to tracing.
#[derive(Debug, Default, Clone)]
pub struct NoticeLog {
    notices: Vec<Notice>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.notices
            .iter()
            .filter(|notice| notice.severity == severity)
            .count()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.notices
            .iter()
            .filter(|notice| notice.severity == Severity::Warning)
            .map(|notice| notice.message.as_str())
    }
}

impl Notifier for NoticeLog {
    fn notify(&mut self, notice: Notice) {
        match notice.severity {
            Severity::Info => info!("{}", notice.message),
            Severity::Warning => warn!("{}", notice.message),
            Severity::Error => error!("{}", notice.message),
        }
        self.notices.push(notice);
    }
}
