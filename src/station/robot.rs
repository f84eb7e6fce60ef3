use super::{Robot, process_failure};
use crate::{
    config::Config,
    error::JobError,
    process::{ToolCall, expand_args},
};
use std::time::Duration;
use tracing::info;

/// Drives the loader through its vendor driver executable.
pub struct DriverRobot {
    exe: String,
    drive: String,
    load_args: Vec<String>,
    eject_args: Vec<String>,
    reject_args: Vec<String>,
    timeout: Duration,
}

impl DriverRobot {
    pub fn new(cfg: &Config) -> Self {
        let robot = &cfg.tools.robot;
        Self {
            exe: robot.exe.clone(),
            drive: cfg.station.drive.clone(),
            load_args: robot.load_args.clone(),
            eject_args: robot.eject_args.clone(),
            reject_args: robot.reject_args.clone(),
            timeout: cfg.timeout(),
        }
    }

    fn run(&self, action: &str, template: &[String]) -> Result<(), JobError> {
        let action = format!("robot {action}");
        let args = expand_args(template, &[("drive", &self.drive)]);
        info!("{action}");
        let out = ToolCall::new(&self.exe, args)
            .run(self.timeout)
            .map_err(|err| {
                process_failure(&action, err, |output| JobError::HardwareCommandFailed {
                    action: action.clone(),
                    code: None,
                    output,
                })
            })?;
        if !out.success() {
            return Err(JobError::HardwareCommandFailed {
                action,
                code: out.code,
                output: out.combined(),
            });
        }
        Ok(())
    }
}

impl Robot for DriverRobot {
    fn load(&self) -> Result<(), JobError> {
        self.run("load", &self.load_args)
    }

    fn eject(&self) -> Result<(), JobError> {
        self.run("eject", &self.eject_args)
    }

    fn reject(&self) -> Result<(), JobError> {
        self.run("reject", &self.reject_args)
    }
}
