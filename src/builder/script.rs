use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::process::Command;

use crate::BoxFuture;
use crate::error::{Diagnostic, ScriptError};

/// Settings forwarded to the bundler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptOptions {
    /// Embed an inline source map.
    pub debug: bool,
    /// Run a minification pass over the bundle. Off unless asked for.
    pub minify: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            debug: true,
            minify: false,
        }
    }
}

/// Resolves the module graph of an entry point into a single bundle.
pub trait Bundler: Send + Sync {
    fn name(&self) -> &str;

    fn bundle<'a>(
        &'a self,
        entry: &'a Utf8Path,
        options: ScriptOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, ScriptError>>;
}

/// Bundles with the `esbuild` executable.
///
/// **Note:** the executable has to be available in `PATH` (or be given by its
/// full path).
#[derive(Debug, Clone)]
pub struct Esbuild {
    program: String,
}

impl Esbuild {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(entry: &Utf8Path, options: ScriptOptions) -> Vec<String> {
        let mut args = vec![
            entry.to_string(),
            "--bundle".into(),
            "--format=iife".into(),
            "--platform=browser".into(),
            "--log-level=error".into(),
            "--color=false".into(),
        ];

        if options.debug {
            args.push("--sourcemap=inline".into());
        }

        if options.minify {
            args.push("--minify".into());
        }

        args
    }
}

impl Default for Esbuild {
    fn default() -> Self {
        Self::new("esbuild")
    }
}

impl Bundler for Esbuild {
    fn name(&self) -> &str {
        &self.program
    }

    fn bundle<'a>(
        &'a self,
        entry: &'a Utf8Path,
        options: ScriptOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, ScriptError>> {
        Box::pin(async move {
            let output = Command::new(&self.program)
                .args(Self::args(entry, options))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| ScriptError::BundlerUnavailable(self.program.clone(), e))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(classify(&stderr));
            }

            Ok(output.stdout)
        })
    }
}

/// Turn esbuild's error log into a typed error.
///
/// ```text
/// ✘ [ERROR] Could not resolve "./missing"
///
///     src/client.js:1:7:
/// ```
pub(crate) fn classify(stderr: &str) -> ScriptError {
    let mut lines = stderr.lines();

    while let Some(line) = lines.next() {
        let Some((_, message)) = line.split_once("[ERROR] ") else {
            continue;
        };

        let location = lines
            .by_ref()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .and_then(|line| line.strip_suffix(':'))
            .map(str::to_string);

        let diagnostic = Diagnostic {
            message: message.trim().to_string(),
            location,
        };

        return if diagnostic.message.starts_with("Could not resolve") {
            ScriptError::Resolution(diagnostic)
        } else {
            ScriptError::Parse(diagnostic)
        };
    }

    ScriptError::Bundler(stderr.trim().to_string())
}

#[derive(Debug, Clone)]
pub struct ScriptReport {
    pub output: Utf8PathBuf,
    pub bytes: usize,
}

/// Bundles a single entry point and writes the result to a fixed location.
#[derive(Clone)]
pub struct ScriptBuilder {
    entry: Utf8PathBuf,
    output: Utf8PathBuf,
    options: ScriptOptions,
    bundler: Arc<dyn Bundler>,
}

impl ScriptBuilder {
    pub fn new(entry: impl Into<Utf8PathBuf>, output: impl Into<Utf8PathBuf>) -> Self {
        Self {
            entry: entry.into(),
            output: output.into(),
            options: ScriptOptions::default(),
            bundler: Arc::new(Esbuild::default()),
        }
    }

    pub fn options(mut self, options: ScriptOptions) -> Self {
        self.options = options;
        self
    }

    pub fn bundler(mut self, bundler: impl Bundler + 'static) -> Self {
        self.bundler = Arc::new(bundler);
        self
    }

    pub fn entry(&self) -> &Utf8Path {
        &self.entry
    }

    pub fn output(&self) -> &Utf8Path {
        &self.output
    }

    pub async fn run(self: Arc<Self>) -> Result<ScriptReport, ScriptError> {
        let s = Instant::now();

        let entry = tokio::fs::metadata(&self.entry).await;
        if !entry.is_ok_and(|meta| meta.is_file()) {
            return Err(ScriptError::Resolution(Diagnostic::new(format!(
                "Entry point \"{}\" not found",
                self.entry
            ))));
        }

        tracing::debug!(bundler = self.bundler.name(), entry = %self.entry, "bundling");
        let data = self.bundler.bundle(&self.entry, self.options).await?;
        let bytes = data.len();

        let this = Arc::clone(&self);
        tokio::task::spawn_blocking(move || crate::io::write_atomic(&this.output, &data)).await??;

        tracing::info!(
            "Wrote {} ({} bytes) {}",
            self.output,
            bytes,
            crate::io::as_overhead(s)
        );

        Ok(ScriptReport {
            output: self.output.clone(),
            bytes,
        })
    }
}

impl std::fmt::Debug for ScriptBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBuilder")
            .field("entry", &self.entry)
            .field("output", &self.output)
            .field("options", &self.options)
            .field("bundler", &self.bundler.name())
            .finish()
    }
}
