//! The standard task graph.
//!
//! | Task      | Dependencies  | Effect                                     |
//! |-----------|---------------|--------------------------------------------|
//! | `css`     |               | run the [`StyleBuilder`] once              |
//! | `js`      |               | run the [`ScriptBuilder`] once             |
//! | `watch`   | `css`, `js`   | then re-run each builder on input changes  |
//! | `default` | `css`, `js`   | nothing else                               |

use std::sync::Arc;
#[cfg(feature = "live")]
use std::time::Duration;

use crate::builder::{Esbuild, ScriptBuilder, ScriptOptions, StyleBuilder, StyleOptions};
use crate::config::Config;
use crate::engine::{Diagnostics, Runner, TaskGraph};
use crate::error::{GraphError, RunError};

pub const CSS: &str = "css";
pub const JS: &str = "js";
pub const WATCH: &str = "watch";
pub const DEFAULT: &str = "default";

/// The configured builders wired into a [`TaskGraph`].
pub struct Pipeline {
    graph: TaskGraph,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self, GraphError> {
        let style = StyleBuilder::new(
            config.styles.inputs.iter().map(|path| config.resolve(path)),
            config.resolve(&config.styles.output),
        )
        .options(StyleOptions {
            compatibility: config.styles.compatibility,
            special_comments: config.styles.special_comments,
        });

        let script = ScriptBuilder::new(
            config.resolve(&config.script.entry),
            config.resolve(&config.script.output),
        )
        .options(ScriptOptions {
            debug: config.script.debug,
            minify: config.script.minify,
        })
        .bundler(Esbuild::new(config.script.bundler.clone()));

        Self::with_builders(&config, style, script)
    }

    /// Wires already constructed builders, e.g. with a custom [`Bundler`](crate::Bundler).
    ///
    /// The `watch` task follows the paths the builders read. Only
    /// `script.watch` and the `[watch]` section are taken from `config`.
    #[cfg_attr(not(feature = "live"), allow(unused_variables))]
    pub fn with_builders(
        config: &Config,
        style: StyleBuilder,
        script: ScriptBuilder,
    ) -> Result<Self, GraphError> {
        #[cfg(feature = "live")]
        let style_paths: Vec<String> = style.inputs().iter().map(ToString::to_string).collect();
        #[cfg(feature = "live")]
        let script_paths: Vec<String> = if config.script.watch.is_empty() {
            vec![script.entry().to_string()]
        } else {
            config.script.watch.clone()
        };

        let style = Arc::new(style);
        let script = Arc::new(script);
        let mut graph = TaskGraph::new();

        graph.task(CSS).run(move || {
            let style = style.clone();
            async move {
                style.run().await?;
                Ok(())
            }
        })?;

        graph.task(JS).run(move || {
            let script = script.clone();
            async move {
                script.run().await?;
                Ok(())
            }
        })?;

        #[cfg(feature = "live")]
        {
            use crate::watch::{WatchBinding, WatchCoordinator};

            let root = config.root.clone();
            let debounce = Duration::from_millis(config.watch.debounce_ms);
            let css = graph.action(CSS)?;
            let js = graph.action(JS)?;

            graph.task(WATCH).depends_on([CSS, JS]).run(move || {
                let coordinator = WatchCoordinator::new(root.clone())
                    .debounce(debounce)
                    .bind(WatchBinding::new(CSS, style_paths.clone(), css.clone()))
                    .bind(WatchBinding::new(JS, script_paths.clone(), js.clone()));

                async move {
                    coordinator.run().await?;
                    Ok(())
                }
            })?;
        }

        graph.task(DEFAULT).depends_on([CSS, JS]).noop()?;

        Ok(Self { graph })
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Runs a task and everything it depends on.
    pub async fn run(&self, task: &str) -> Result<Diagnostics, RunError> {
        Runner::run(&self.graph, task).await
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use camino::{Utf8Path, Utf8PathBuf};

    use super::*;
    use crate::BoxFuture;
    use crate::builder::Bundler;
    use crate::error::{ScriptError, StyleError};

    /// Bundles by copying the entry point.
    struct Copy;

    impl Bundler for Copy {
        fn name(&self) -> &str {
            "copy"
        }

        fn bundle<'a>(
            &'a self,
            entry: &'a Utf8Path,
            _: ScriptOptions,
        ) -> BoxFuture<'a, Result<Vec<u8>, ScriptError>> {
            Box::pin(async move { Ok(fs::read(entry)?) })
        }
    }

    fn fixture() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().canonicalize().unwrap()).unwrap();
        fs::create_dir_all(root.join("static/css")).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();

        let config = Config {
            root,
            ..Config::default()
        };

        for (i, input) in config.styles.inputs.iter().enumerate() {
            fs::write(config.resolve(input), format!(".u{i} {{ top: {i}px; }}\n")).unwrap();
        }
        fs::write(config.resolve(&config.script.entry), "console.log(1);\n").unwrap();

        (dir, config)
    }

    fn pipeline(config: &Config) -> Pipeline {
        let style = StyleBuilder::new(
            config.styles.inputs.iter().map(|path| config.resolve(path)),
            config.resolve(&config.styles.output),
        );
        let script = ScriptBuilder::new(
            config.resolve(&config.script.entry),
            config.resolve(&config.script.output),
        )
        .bundler(Copy);

        Pipeline::with_builders(config, style, script).unwrap()
    }

    #[cfg(feature = "live")]
    #[test]
    fn defines_the_standard_tasks() {
        let pipeline = Pipeline::new(Config::default()).unwrap();
        let graph = pipeline.graph();

        assert_eq!(graph.names().collect::<Vec<_>>(), ["css", "js", "watch", "default"]);
        assert_eq!(graph.dependencies("watch").unwrap(), ["css", "js"]);
        assert_eq!(graph.dependencies("default").unwrap(), ["css", "js"]);
        assert!(graph.dependencies("css").unwrap().is_empty());
    }

    #[tokio::test]
    async fn default_builds_both_outputs() {
        let (_dir, config) = fixture();

        let diagnostics = pipeline(&config).run(DEFAULT).await.unwrap();

        let css = fs::read_to_string(config.resolve(&config.styles.output)).unwrap();
        let js = fs::read_to_string(config.resolve(&config.script.output)).unwrap();
        assert!(css.find(".u0{").unwrap() < css.find(".u3{").unwrap());
        assert_eq!(js, "console.log(1);\n");
        assert_eq!(diagnostics.execution_times.len(), 3);
    }

    #[tokio::test]
    async fn single_task_leaves_the_other_output_alone() {
        let (_dir, config) = fixture();

        pipeline(&config).run(CSS).await.unwrap();

        assert!(config.resolve(&config.styles.output).exists());
        assert!(!config.resolve(&config.script.output).exists());
    }

    #[tokio::test]
    async fn failing_task_fails_the_run() {
        let (_dir, config) = fixture();
        fs::remove_file(config.resolve(&config.styles.inputs[2])).unwrap();

        let err = pipeline(&config).run(DEFAULT).await.unwrap_err();

        let RunError::Task { name, source } = err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(name, "css");
        assert!(matches!(
            source.downcast_ref::<StyleError>(),
            Some(StyleError::FileNotFound(path)) if path.ends_with("cburnett.css")
        ));
    }

    #[cfg(feature = "live")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn touching_the_entry_rebuilds_only_the_script() {
        let (_dir, config) = fixture();
        let config = Config {
            watch: crate::config::WatchConfig { debounce_ms: 50 },
            ..config
        };
        let pipeline = Arc::new(pipeline(&config));
        let style_output = config.resolve(&config.styles.output);
        let script_output = config.resolve(&config.script.output);

        let handle = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.run(WATCH).await }
        });

        tokio::time::timeout(Duration::from_secs(10), async {
            while !(style_output.exists() && script_output.exists()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        // Give the watcher time to register.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let style_before = fs::metadata(&style_output).unwrap().modified().unwrap();

        fs::write(config.resolve(&config.script.entry), "console.log(2);\n").unwrap();

        tokio::time::timeout(Duration::from_secs(10), async {
            while fs::read_to_string(&script_output).unwrap() != "console.log(2);\n" {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(fs::metadata(&style_output).unwrap().modified().unwrap(), style_before);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[cfg(feature = "live")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn watch_follows_the_paths_of_custom_builders() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().canonicalize().unwrap()).unwrap();
        fs::create_dir_all(root.join("css")).unwrap();
        fs::write(root.join("css/site.css"), ".site { top: 0; }").unwrap();
        fs::write(root.join("main.js"), "main();\n").unwrap();

        let config = Config {
            root: root.clone(),
            watch: crate::config::WatchConfig { debounce_ms: 50 },
            ..Config::default()
        };
        let style = StyleBuilder::new([root.join("css/site.css")], root.join("out/site.min.css"));
        let script = ScriptBuilder::new(root.join("main.js"), root.join("out/main.min.js")).bundler(Copy);
        let pipeline = Arc::new(Pipeline::with_builders(&config, style, script).unwrap());
        let style_output = root.join("out/site.min.css");

        let handle = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.run(WATCH).await }
        });

        tokio::time::timeout(Duration::from_secs(10), async {
            while !(style_output.exists() && root.join("out/main.min.js").exists()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        // Give the watcher time to register.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!handle.is_finished());

        fs::write(root.join("css/site.css"), ".changed { top: 1px; }").unwrap();

        tokio::time::timeout(Duration::from_secs(10), async {
            while !fs::read_to_string(&style_output).unwrap().contains(".changed{") {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert!(!handle.is_finished());
        handle.abort();
    }
}
