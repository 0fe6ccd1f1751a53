pub mod command;
pub mod oidc;

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const ENV_FILE_VAR: &str = "GITHUB_ENV";
const OUTPUT_FILE_VAR: &str = "GITHUB_OUTPUT";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to write to {0:?}: {1}")]
    FileCommand(PathBuf, io::Error),
    #[error("Failed to issue workflow command: {0}")]
    WorkflowCommand(io::Error),
    #[error(transparent)]
    Command(#[from] command::Error),
    #[error("Missing required environment variables. Are you running in GitHub Actions?")]
    MissingContext,
}

/// The pipeline surface a step talks to: environment, secret masking and step outputs.
pub trait ActionsRuntime {
    /// Reads an environment variable; empty values read as unset.
    fn env(&self, name: &str) -> Option<String>;
    /// Sets a variable for this process and for the following steps of the job.
    fn export_variable(&self, name: &str, value: &str) -> Result<(), Error>;
    /// Registers a value to be masked in every subsequent log line.
    fn set_secret(&self, secret: &str) -> Result<(), Error>;
    fn set_output(&self, name: &str, value: &str) -> Result<(), Error>;
}

/// [`ActionsRuntime`] backed by the process environment and the runner's file commands.
pub struct GithubActions {
    env_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    command_writer: Mutex<Box<dyn Write + Send + 'static>>,
}

impl GithubActions {
    pub fn new(
        env_file: Option<PathBuf>,
        output_file: Option<PathBuf>,
        command_writer: Option<Box<dyn Write + Send + 'static>>,
    ) -> Self {
        Self {
            env_file,
            output_file,
            command_writer: Mutex::new(match command_writer {
                Some(cw) => cw,
                None => Box::new(io::stdout()),
            }),
        }
    }

    pub fn from_env() -> Self {
        let file_var = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self::new(file_var(ENV_FILE_VAR), file_var(OUTPUT_FILE_VAR), None)
    }

    fn issue(&self, name: &str, properties: &[(&str, &str)], message: &str) -> Result<(), Error> {
        let mut writer = self
            .command_writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(writer, "{}", command::issue_command(name, properties, message))
            .and_then(|_| writer.flush())
            .map_err(Error::WorkflowCommand)
    }

    fn append_file_command(path: &Path, key: &str, value: &str) -> Result<(), Error> {
        let message = command::file_command_message(key, value)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(message.as_bytes()))
            .map_err(|err| Error::FileCommand(path.to_path_buf(), err))
    }
}

impl ActionsRuntime for GithubActions {
    fn env(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }

    fn export_variable(&self, name: &str, value: &str) -> Result<(), Error> {
        std::env::set_var(name, value);
        match &self.env_file {
            Some(path) => Self::append_file_command(path, name, value),
            None => self.issue("set-env", &[("name", name)], value),
        }
    }

    fn set_secret(&self, secret: &str) -> Result<(), Error> {
        self.issue("add-mask", &[], secret)
    }

    fn set_output(&self, name: &str, value: &str) -> Result<(), Error> {
        match &self.output_file {
            Some(path) => Self::append_file_command(path, name, value),
            None => self.issue("set-output", &[("name", name)], value),
        }
    }
}

/// Metadata the runner exposes about the workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubContext {
    pub repository: String,
    pub workflow: String,
    pub action: String,
    pub actor: String,
    pub sha: String,
    pub workspace: PathBuf,
    pub git_ref: Option<String>,
}

impl GithubContext {
    pub fn from_runtime<R: ActionsRuntime>(runtime: &R) -> Result<Self, Error> {
        let required = |name: &str| runtime.env(name).ok_or(Error::MissingContext);
        Ok(Self {
            repository: required("GITHUB_REPOSITORY")?,
            workflow: required("GITHUB_WORKFLOW")?,
            action: required("GITHUB_ACTION")?,
            actor: required("GITHUB_ACTOR")?,
            sha: required("GITHUB_SHA")?,
            workspace: PathBuf::from(required("GITHUB_WORKSPACE")?),
            git_ref: runtime.env("GITHUB_REF"),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeRuntime;
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_export_variable_appends_file_command() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join("env");
        let runtime = GithubActions::new(Some(env_file.clone()), None, None);

        runtime
            .export_variable("CONFIGURE_AWS_CREDENTIALS_TEST_EXPORT", "value-1")
            .unwrap();
        runtime
            .export_variable("CONFIGURE_AWS_CREDENTIALS_TEST_EXPORT", "value-2")
            .unwrap();

        let contents = std::fs::read_to_string(&env_file).unwrap();
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("CONFIGURE_AWS_CREDENTIALS_TEST_EXPORT<<ghadelimiter_"));
        assert_eq!(lines[1], "value-1");
        assert_eq!(lines[4], "value-2");
        assert_eq!(
            std::env::var("CONFIGURE_AWS_CREDENTIALS_TEST_EXPORT").unwrap(),
            "value-2"
        );
    }

    #[test]
    fn test_commands_fall_back_to_stdout_protocol() {
        let buffer = SharedBuffer::default();
        let runtime = GithubActions::new(None, None, Some(Box::new(buffer.clone())));

        runtime.set_secret("AKIA%SECRET").unwrap();
        runtime.set_output("aws-account-id", "123456789012").unwrap();
        runtime
            .export_variable("CONFIGURE_AWS_CREDENTIALS_TEST_FALLBACK", "x")
            .unwrap();

        assert_eq!(
            buffer.contents(),
            "::add-mask::AKIA%25SECRET\n\
             ::set-output name=aws-account-id::123456789012\n\
             ::set-env name=CONFIGURE_AWS_CREDENTIALS_TEST_FALLBACK::x\n"
        );
    }

    #[test]
    fn test_set_output_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let output_file = dir.path().join("output");
        let runtime = GithubActions::new(None, Some(output_file.clone()), None);

        runtime.set_output("aws-account-id", "123456789012").unwrap();

        let contents = std::fs::read_to_string(&output_file).unwrap();
        assert!(contents.starts_with("aws-account-id<<ghadelimiter_"));
        assert!(contents.contains("\n123456789012\n"));
    }

    #[test]
    fn test_context_requires_runner_variables() {
        let runtime = FakeRuntime::with_env(&[
            ("GITHUB_REPOSITORY", "octo/repo"),
            ("GITHUB_WORKFLOW", "ci"),
            ("GITHUB_ACTION", "run1"),
            ("GITHUB_ACTOR", "octocat"),
            ("GITHUB_SHA", "abc123"),
        ]);
        assert!(matches!(
            GithubContext::from_runtime(&runtime),
            Err(Error::MissingContext)
        ));

        runtime.set_env("GITHUB_WORKSPACE", "/home/runner/work");
        let context = GithubContext::from_runtime(&runtime).unwrap();
        assert_eq!(context.workspace, PathBuf::from("/home/runner/work"));
        assert_eq!(context.git_ref, None);
    }
}
