//! The two asset builders.
//!
//! * [`StyleBuilder`] minifies and concatenates an ordered list of
//!   stylesheets using `grass`.
//! * [`ScriptBuilder`] hands a single entry point to a [`Bundler`], `esbuild`
//!   by default.
//!
//! Both write their output atomically: on failure the previous output file is
//! left untouched.

mod script;
mod style;

pub use script::{Bundler, Esbuild, ScriptBuilder, ScriptOptions, ScriptReport};
pub use style::{StyleBuilder, StyleOptions, StyleReport, UnitStats, minify};
