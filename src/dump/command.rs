use tokio::process::Command;

use crate::config::DumpConfig;

/// The external program that writes the dump to its stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpTool {
    program: String,
    leading_args: Vec<String>,
}

impl Default for DumpTool {
    fn default() -> Self {
        DumpTool::new("mysqldump")
    }
}

impl DumpTool {
    pub fn new(program: impl Into<String>) -> Self {
        DumpTool {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Arguments placed before the connection arguments, e.g. a wrapper's own flags.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn command(&self, config: &DumpConfig) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args).args(dump_args(config));
        cmd
    }

    /// The command line as it can be logged.
    pub fn display(&self, config: &DumpConfig) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.leading_args.iter().cloned());
        parts.extend(dump_args(config).into_iter().map(|arg| {
            if arg.starts_with("--password=") {
                "--password=***".to_string()
            } else {
                arg
            }
        }));
        parts.join(" ")
    }
}

/// mysqldump arguments, database name last.
pub fn dump_args(config: &DumpConfig) -> Vec<String> {
    vec![
        format!("--user={}", config.user),
        format!("--password={}", config.password),
        format!("--host={}", config.host),
        format!("--port={}", config.port),
        "--no-tablespaces".to_string(),
        config.database.clone(),
    ]
}
