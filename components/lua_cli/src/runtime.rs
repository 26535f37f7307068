//! Runtime orchestration for the CLI
//!
//! Files and dumps go through a dedicated [`Script`] so that chunks keep
//! their file names; inline code and the REPL run on the pooled
//! [`ScriptEngine`].

use std::fs;
use std::path::Path;

use core_types::Value;
use interpreter::{Script, ScriptOptions};
use log::debug;
use script_host::{EngineConfig, ScriptEngine};

use crate::cli::Cli;
use crate::error::{CliError, CliResult};

/// Everything one CLI invocation executes against
pub struct Runtime {
    engine: ScriptEngine,
    script: Script,
}

impl Runtime {
    /// Runtime for `config`
    ///
    /// # Example
    /// ```
    /// use lua_cli::Runtime;
    /// use script_host::EngineConfig;
    ///
    /// let runtime = Runtime::new(EngineConfig::default());
    /// assert_eq!(runtime.eval("return 1 + 1").unwrap().as_number(), Some(2.0));
    /// ```
    pub fn new(config: EngineConfig) -> Self {
        let mut options = ScriptOptions::default();
        options.check_thread_access = config.check_thread_access;
        options.use_classic_error_locations = config.classic_error_locations;
        let script = Script::with_options(options);
        script
            .performance_stats()
            .set_enabled(config.performance_counters);

        Self {
            engine: ScriptEngine::with_config(config),
            script,
        }
    }

    /// Runtime configured by the `--config` file and the flags overriding it
    pub fn from_cli(cli: &Cli) -> CliResult<Self> {
        let mut config = match &cli.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        config.classic_error_locations |= cli.classic_errors;
        config.performance_counters |= cli.perf;
        debug!("engine configuration: {:?}", config);
        Ok(Self::new(config))
    }

    /// The pooled engine behind `eval` and the REPL
    pub fn engine(&self) -> &ScriptEngine {
        &self.engine
    }

    /// Run a source file or binary dump with string arguments
    pub fn run_file(&self, path: &Path, args: &[String]) -> CliResult<Vec<Value>> {
        let function = self
            .script
            .load_file(path, None, None)
            .map_err(|err| file_error(path, err))?;
        let args = args.iter().map(|a| Value::from(a.as_str())).collect();
        Ok(self.script.call_multi(&function, args)?)
    }

    /// Evaluate inline code on the engine
    pub fn eval(&self, code: &str) -> CliResult<Value> {
        Ok(self.engine.execute(code)?)
    }

    /// Compile `source` and write its dump to `out`; returns the bytes written
    pub fn dump_file(&self, source: &Path, out: &Path, base64: bool) -> CliResult<usize> {
        let function = self
            .script
            .load_file(source, None, None)
            .map_err(|err| file_error(source, err))?;

        let bytes = if base64 {
            self.script.dump_base64(&function)?.into_bytes()
        } else {
            self.script.dump(&function, Vec::new())?
        };
        fs::write(out, &bytes).map_err(|err| CliError::io(out, err))?;
        debug!("wrote {} bytes of dump to {}", bytes.len(), out.display());
        Ok(bytes.len())
    }

    /// Engine statistics as pretty JSON
    pub fn statistics_json(&self) -> CliResult<String> {
        Ok(self.engine.statistics().to_json()?)
    }

    /// Performance counters of the file runner, one line per counter;
    /// empty when counters are disabled
    pub fn performance_log(&self) -> String {
        self.script.performance_stats().performance_log()
    }
}

fn file_error(path: &Path, err: core_types::ScriptError) -> CliError {
    match err {
        core_types::ScriptError::Io(source) => CliError::io(path, source),
        other => CliError::Script(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_uses_engine() {
        let runtime = Runtime::new(EngineConfig::default());
        runtime.eval("return 1").unwrap();
        assert_eq!(runtime.engine().statistics().scripts_run, 1);
    }

    #[test]
    fn test_missing_file_names_path() {
        let runtime = Runtime::new(EngineConfig::default());
        let err = runtime
            .run_file(Path::new("/nonexistent/script.lua"), &[])
            .unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/script.lua"));
    }
}
