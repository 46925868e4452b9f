use async_trait::async_trait;
use courier_slack::commands::{FortuneError, FortuneSource};
use tokio::process::Command;

/// Adage source that shells out to the system `fortune(1)` program.
///
/// The dispatcher bounds the wait; this impl only reports invocation
/// failures (missing program, non-zero exit, empty output).
pub struct SystemFortuneSource {
    program: String,
}

impl SystemFortuneSource {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

impl Default for SystemFortuneSource {
    fn default() -> Self {
        Self::with_program("fortune")
    }
}

#[async_trait]
impl FortuneSource for SystemFortuneSource {
    async fn fortune(&self) -> Result<String, FortuneError> {
        let output = Command::new(&self.program)
            .output()
            .await
            .map_err(|error| FortuneError::Invocation(error.to_string()))?;

        if !output.status.success() {
            return Err(FortuneError::Invocation(format!("exit status {}", output.status)));
        }

        let adage = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if adage.is_empty() {
            return Err(FortuneError::Invocation("produced no output".to_owned()));
        }

        Ok(adage)
    }
}

#[cfg(test)]
mod tests {
    use super::SystemFortuneSource;
    use courier_slack::commands::{FortuneError, FortuneSource};

    #[tokio::test]
    async fn missing_program_reports_an_invocation_failure() {
        let source = SystemFortuneSource::with_program("/nonexistent/fortune-program");

        let error = source.fortune().await.expect_err("missing program must fail");
        assert!(matches!(error, FortuneError::Invocation(_)));
    }

    #[tokio::test]
    async fn a_program_with_output_yields_a_trimmed_adage() {
        let source = SystemFortuneSource::with_program("uname");

        let adage = source.fortune().await.expect("uname should produce output");
        assert!(!adage.is_empty());
        assert_eq!(adage, adage.trim());
    }
}
