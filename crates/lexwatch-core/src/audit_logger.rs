use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const DECISION_LOG: &str = "DecisionLog.md";

/// Appends every human decision to a markdown audit trail.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    path: PathBuf,
}

impl AuditLogger {
    /// Logs into `DecisionLog.md` under `dir`.
    pub fn new(dir: &Path) -> Self {
        Self::at(dir.join(DECISION_LOG))
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one row.
    pub fn log_decision(&self, case_id: &str, decision: &str, details: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        if !self.path.exists() {
            fs::write(
                &self.path,
                "# Decision Log\n\n| Timestamp | Case | Decision | Details |\n| --- | --- | --- | --- |\n",
            )?;
        }
        let timestamp = chrono::Utc::now().to_rfc3339();
        let mut file = fs::OpenOptions::new().append(true).open(&self.path)?;
        writeln!(
            file,
            "| {timestamp} | {case_id} | {decision} | {} |",
            escape_cell(details)
        )
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rows_append_under_header() {
        let temp = TempDir::new().unwrap();
        let logger = AuditLogger::new(temp.path());
        logger.log_decision("case-1", "approve", "Looks good").unwrap();
        logger
            .log_decision("case-1", "modify", "Add | spoliation\ncategory")
            .unwrap();

        let content = fs::read_to_string(logger.path()).unwrap();
        assert_eq!(content.matches("# Decision Log").count(), 1);
        assert!(content.contains("| case-1 | approve | Looks good |"));
        assert!(content.contains("| case-1 | modify | Add \\| spoliation category |"));
    }
}
