// Error types - the fatal provisioning steps
//
// Everything after `apply` reports failure as an absent result instead,
// so this is the only typed error the pipeline raises.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Failed to run `{program} {step}`: {message}")]
    Spawn {
        program: String,
        step: &'static str,
        message: String,
    },

    #[error("`{program} {step}` failed with {status}")]
    StepFailed {
        program: String,
        step: &'static str,
        status: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failed_display() {
        let err = ProvisionError::StepFailed {
            program: "terraform".to_string(),
            step: "apply",
            status: "exit code 1".to_string(),
        };
        assert_eq!(err.to_string(), "`terraform apply` failed with exit code 1");
    }

    #[test]
    fn test_conversion_into_anyhow() {
        let err = ProvisionError::Spawn {
            program: "terraform".to_string(),
            step: "init",
            message: "No such file or directory".to_string(),
        };
        let any: anyhow::Error = err.into();
        assert!(any.to_string().contains("terraform init"));
        assert!(any.downcast_ref::<ProvisionError>().is_some());
    }
}
