use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::config::{Compatibility, SpecialComments};
use crate::error::StyleError;

/// Separator placed between minified units in the bundle.
const SEPARATOR: &str = "\n";

/// Minifier settings applied to every unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StyleOptions {
    pub compatibility: Compatibility,
    pub special_comments: SpecialComments,
}

/// Size of a single stylesheet before and after minification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStats {
    pub name: Utf8PathBuf,
    pub original: usize,
    pub minified: usize,
}

#[derive(Debug, Clone)]
pub struct StyleReport {
    pub output: Utf8PathBuf,
    pub units: Vec<UnitStats>,
    pub bytes: usize,
}

/// Concatenates an ordered list of stylesheets into one minified file.
///
/// Each input is minified on its own (in parallel) and the results are joined
/// in input order. All inputs are read before anything is written, so a
/// missing file never leaves a truncated bundle behind.
#[derive(Debug, Clone)]
pub struct StyleBuilder {
    inputs: Vec<Utf8PathBuf>,
    output: Utf8PathBuf,
    options: StyleOptions,
}

impl StyleBuilder {
    pub fn new<I, P>(inputs: I, output: impl Into<Utf8PathBuf>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            output: output.into(),
            options: StyleOptions::default(),
        }
    }

    pub fn options(mut self, options: StyleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn inputs(&self) -> &[Utf8PathBuf] {
        &self.inputs
    }

    pub fn output(&self) -> &Utf8Path {
        &self.output
    }

    /// Build the bundle on the calling thread.
    pub fn build(&self) -> Result<StyleReport, StyleError> {
        let s = Instant::now();

        let sources = self
            .inputs
            .par_iter()
            .map(|path| read_unit(path).map(|text| (path, text)))
            .collect::<Result<Vec<_>, _>>()?;

        let units = sources
            .par_iter()
            .map(|(path, text)| {
                minify(text, &self.options)
                    .map(|css| (*path, text.len(), css))
                    .map_err(|source| StyleError::BuildFailure {
                        unit: path.to_path_buf(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut stats = Vec::with_capacity(units.len());
        for (path, original, css) in &units {
            let name = path.file_name().unwrap_or(path.as_str());
            tracing::info!(
                unit = name,
                original = *original,
                minified = css.len(),
                "{name}: {original} -> {}",
                css.len()
            );

            stats.push(UnitStats {
                name: path.to_path_buf(),
                original: *original,
                minified: css.len(),
            });
        }

        let bundle = units
            .iter()
            .map(|(_, _, css)| css.as_str())
            .collect::<Vec<_>>()
            .join(SEPARATOR);

        crate::io::write_atomic(&self.output, bundle.as_bytes())?;

        tracing::info!(
            "Wrote {} ({} bytes) {}",
            self.output,
            bundle.len(),
            crate::io::as_overhead(s)
        );

        Ok(StyleReport {
            output: self.output.clone(),
            units: stats,
            bytes: bundle.len(),
        })
    }

    /// Build the bundle on the blocking thread pool.
    pub async fn run(self: Arc<Self>) -> Result<StyleReport, StyleError> {
        tokio::task::spawn_blocking(move || self.build()).await?
    }
}

fn read_unit(path: &Utf8Path) -> Result<String, StyleError> {
    fs::read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => StyleError::FileNotFound(path.to_path_buf()),
        _ => StyleError::Io(err),
    })
}

/// Minify a single plain CSS unit.
pub fn minify(source: &str, options: &StyleOptions) -> Result<String, Box<grass::Error>> {
    let legacy = options.compatibility == Compatibility::Ie8;
    let source = if legacy {
        source.trim_start_matches('\u{feff}')
    } else {
        source
    };

    let opts = grass::Options::default()
        .style(grass::OutputStyle::Compressed)
        .input_syntax(grass::InputSyntax::Css)
        .allows_charset(!legacy)
        .quiet(true);

    let css = grass::from_string(source.to_owned(), &opts)?;

    Ok(match options.special_comments {
        SpecialComments::Strip => strip_special_comments(&css),
        SpecialComments::Keep => css,
    })
}

/// Remove every `/*! ... */` comment outside of string literals.
pub(crate) fn strip_special_comments(css: &str) -> String {
    let bytes = css.as_bytes();
    let mut out = String::with_capacity(css.len());
    let mut quote = None;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == q {
                    quote = None;
                }
                i += 1;
            }
            None if b == b'"' || b == b'\'' => {
                quote = Some(b);
                i += 1;
            }
            None if bytes[i..].starts_with(b"/*") => {
                let end = css[i + 2..]
                    .find("*/")
                    .map_or(bytes.len(), |n| i + 2 + n + 2);

                if bytes.get(i + 2) == Some(&b'!') {
                    out.push_str(&css[start..i]);
                    start = end;
                }
                i = end;
            }
            None => i += 1,
        }
    }

    out.push_str(&css[start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(files: &[(&str, &str)]) -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        for (name, text) in files {
            fs::write(root.join(name), text).unwrap();
        }
        (dir, root)
    }

    fn builder(root: &Utf8Path, names: &[&str]) -> StyleBuilder {
        StyleBuilder::new(
            names.iter().map(|name| root.join(name)),
            root.join("out/style.min.css"),
        )
    }

    #[test]
    fn minify_drops_whitespace_and_comments() {
        let css = minify("a {\n  color: red;\n}\n/* note */\n", &StyleOptions::default()).unwrap();

        assert_eq!(css.trim(), "a{color:red}");
    }

    #[test]
    fn concatenates_minified_units_in_input_order() {
        let files = [
            ("a.css", ".a {\n  margin: 0;\n}\n"),
            ("b.css", ".b {\n  margin: 1px;\n}\n"),
            ("c.css", ".c {\n  margin: 2px;\n}\n"),
            ("d.css", ".d {\n  margin: 3px;\n}\n"),
        ];
        let (_dir, root) = fixture(&files);

        let report = builder(&root, &["a.css", "b.css", "c.css", "d.css"])
            .build()
            .unwrap();

        let expected = files
            .iter()
            .map(|(_, text)| minify(text, &StyleOptions::default()).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        let written = fs::read_to_string(root.join("out/style.min.css")).unwrap();

        assert_eq!(written, expected);
        assert_eq!(report.bytes, written.len());

        let positions: Vec<_> = [".a{", ".b{", ".c{", ".d{"]
            .iter()
            .map(|needle| written.find(needle).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn order_follows_the_list_not_the_file_names() {
        let (_dir, root) = fixture(&[("a.css", ".a{top:0}"), ("b.css", ".b{top:0}")]);

        builder(&root, &["b.css", "a.css"]).build().unwrap();

        let written = fs::read_to_string(root.join("out/style.min.css")).unwrap();
        assert!(written.find(".b{").unwrap() < written.find(".a{").unwrap());
    }

    #[test]
    fn reports_sizes_per_unit() {
        let (_dir, root) = fixture(&[("a.css", "a {\n  color: red;\n}\n")]);

        let report = builder(&root, &["a.css"]).build().unwrap();

        assert_eq!(report.units.len(), 1);
        assert_eq!(report.units[0].name, root.join("a.css"));
        assert_eq!(report.units[0].original, 20);
        assert!(report.units[0].minified < report.units[0].original);
    }

    #[test]
    fn rebuilding_unchanged_inputs_is_byte_identical() {
        let (_dir, root) = fixture(&[("a.css", "a { color: red; }"), ("b.css", "b { color: blue; }")]);
        let builder = builder(&root, &["a.css", "b.css"]);

        builder.build().unwrap();
        let first = fs::read(builder.output()).unwrap();
        builder.build().unwrap();
        let second = fs::read(builder.output()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn missing_input_keeps_previous_output() {
        let (_dir, root) = fixture(&[("a.css", "a { color: red; }"), ("b.css", "b { color: blue; }")]);
        let builder = builder(&root, &["a.css", "b.css"]);

        builder.build().unwrap();
        let before = fs::read(builder.output()).unwrap();

        fs::remove_file(root.join("b.css")).unwrap();
        let err = builder.build().unwrap_err();

        assert!(matches!(err, StyleError::FileNotFound(ref path) if *path == root.join("b.css")));
        assert_eq!(fs::read(builder.output()).unwrap(), before);
    }

    #[test]
    fn minifier_failure_writes_nothing() {
        let (_dir, root) = fixture(&[("a.css", "a { color: red; }"), ("b.css", "b { color: blue;")]);

        let err = builder(&root, &["a.css", "b.css"]).build().unwrap_err();

        assert!(matches!(err, StyleError::BuildFailure { ref unit, .. } if *unit == root.join("b.css")));
        assert!(!root.join("out/style.min.css").exists());
    }

    #[test]
    fn legacy_mode_emits_no_charset_or_bom() {
        let options = StyleOptions {
            compatibility: Compatibility::Ie8,
            ..StyleOptions::default()
        };

        let css = minify("\u{feff}a::before { content: \"é\"; }", &options).unwrap();

        assert!(!css.starts_with('\u{feff}'));
        assert!(!css.contains("@charset"));
        assert!(css.contains('é'));
    }

    #[test]
    fn strips_special_comments_only() {
        let css = "/*! license */a{color:red}/* plain */b{top:0}/*!x*/";

        assert_eq!(strip_special_comments(css), "a{color:red}/* plain */b{top:0}");
    }

    #[test]
    fn keeps_comment_markers_inside_strings() {
        let css = r#"a::before{content:"/*! not a comment */"}b{content:'\'/*!'}"#;

        assert_eq!(strip_special_comments(css), css);
    }

    #[test]
    fn unterminated_special_comment_runs_to_end() {
        assert_eq!(strip_special_comments("a{top:0}/*! open"), "a{top:0}");
    }

    #[tokio::test]
    async fn runs_on_the_blocking_pool() {
        let (_dir, root) = fixture(&[("a.css", "a { color: red; }")]);
        let builder = Arc::new(builder(&root, &["a.css"]));

        let report = builder.clone().run().await.unwrap();

        assert_eq!(report.output, builder.output());
        assert!(builder.output().exists());
    }
}
