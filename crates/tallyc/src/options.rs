//! Compiler options, read from the `[compiler]` table of a TOML document.
//!
//! ```toml
//! [compiler]
//! target = "typed"
//! max_type_iterations = 8
//! split_read_write = false
//! ```

use serde::Deserialize;
use tally_typeck::DEFAULT_MAX_PASSES;

use crate::Stage;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Last stage to run.
    pub target: Stage,
    /// Cap on type resolution passes.
    pub max_type_iterations: usize,
    pub split_read_write: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            target: Stage::Split,
            max_type_iterations: DEFAULT_MAX_PASSES,
            split_read_write: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    compiler: CompileOptions,
}

impl CompileOptions {
    /// Parse options from a TOML string. A document without a `[compiler]`
    /// table yields the defaults.
    pub fn from_toml_str(content: &str) -> Result<CompileOptions, String> {
        toml::from_str::<Document>(content)
            .map(|doc| doc.compiler)
            .map_err(|e| format!("Failed to parse compiler options: {}", e))
    }

    /// The stage compilation actually stops at.
    pub fn last_stage(&self) -> Stage {
        if !self.split_read_write && self.target == Stage::Split {
            Stage::Pipelines
        } else {
            self.target
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_options() {
        let toml = r#"
[compiler]
target = "typed"
max_type_iterations = 8
split_read_write = false
"#;
        let options = CompileOptions::from_toml_str(toml).unwrap();
        assert_eq!(options.target, Stage::Typed);
        assert_eq!(options.max_type_iterations, 8);
        assert!(!options.split_read_write);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let options = CompileOptions::from_toml_str("[compiler]\ntarget = \"pipelines\"\n").unwrap();
        assert_eq!(options.target, Stage::Pipelines);
        assert_eq!(options.max_type_iterations, 32);
        assert!(options.split_read_write);

        let empty = CompileOptions::from_toml_str("").unwrap();
        assert_eq!(empty, CompileOptions::default());
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let result = CompileOptions::from_toml_str("[compiler]\ntarget = \"codegen\"\n");
        let err = result.unwrap_err();
        assert!(
            err.starts_with("Failed to parse compiler options"),
            "expected a parse error, got: {}",
            err
        );
    }

    #[test]
    fn disabling_the_split_stops_after_pipelines() {
        let options = CompileOptions {
            split_read_write: false,
            ..CompileOptions::default()
        };
        assert_eq!(options.last_stage(), Stage::Pipelines);

        let typed = CompileOptions {
            target: Stage::Typed,
            split_read_write: false,
            ..CompileOptions::default()
        };
        assert_eq!(typed.last_stage(), Stage::Typed);
    }
}
