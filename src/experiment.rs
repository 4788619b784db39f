//! Choice of the pretrained network configuration for an experiment.
//!
//! Five flags describe an experiment: the input modality, the output task,
//! whether dropout sampling is used for uncertainty, the tract definition and
//! whether the input peaks come from bedpostX. [`select`] maps them to the
//! identifier of a pretrained configuration, or explains why no configuration
//! exists for that combination.
//!
//! The decision is an ordered rule table where the first matching rule wins.
//! It is expanded once over all 64 flag combinations.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use thiserror::Error;

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every value, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Canonical spelling.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> crate::Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::Error::Configuration(format!(
                        concat!("unknown ", $what, " '{}', expected one of {}"),
                        other,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }
    };
}

string_enum! {
    /// Modality fed to the network.
    InputType, "input type" {
        /// Fiber orientation peaks.
        Peaks => "peaks",
        /// T1-weighted anatomy.
        T1 => "T1",
    }
}

string_enum! {
    /// Task the network is trained for.
    OutputType, "output type" {
        /// Binary bundle masks.
        TractSegmentation => "tract_segmentation",
        /// Bundle start and end regions.
        EndingsSegmentation => "endings_segmentation",
        /// Tract orientation maps.
        Tom => "TOM",
        /// Density map regression.
        DmRegression => "dm_regression",
    }
}

string_enum! {
    /// Atlas the bundles are defined by.
    TractDefinition, "tract definition" {
        /// The 72-bundle TractQuerier+ definition.
        TractQuerierPlus => "TractQuerier+",
        /// The AutoPTX definition.
        AutoPtx => "AutoPTX",
    }
}

impl Default for TractDefinition {
    fn default() -> Self {
        Self::TractQuerierPlus
    }
}

/// Identifier of a pretrained network configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigId(&'static str);

impl ConfigId {
    /// The identifier text.
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// No pretrained configuration exists for the requested flags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported combination: {reason}")]
pub struct UnsupportedCombination {
    reason: &'static str,
}

impl UnsupportedCombination {
    /// Human-readable explanation.
    pub fn reason(&self) -> &'static str {
        self.reason
    }
}

/// The five flags that pick a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Experiment {
    /// Input modality.
    pub input_type: InputType,
    /// Output task.
    pub output_type: OutputType,
    /// Monte Carlo dropout for uncertainty maps.
    pub dropout_sampling: bool,
    /// Bundle atlas.
    pub tract_definition: TractDefinition,
    /// Peaks come from bedpostX instead of CSD.
    pub bedpostx_input: bool,
}

impl Experiment {
    /// Every flag combination.
    pub fn all() -> impl Iterator<Item = Self> {
        [false, true].into_iter().flat_map(|bedpostx_input| {
            TractDefinition::ALL.iter().flat_map(move |&tract_definition| {
                InputType::ALL.iter().flat_map(move |&input_type| {
                    OutputType::ALL.iter().flat_map(move |&output_type| {
                        [false, true].into_iter().map(move |dropout_sampling| Self {
                            input_type,
                            output_type,
                            dropout_sampling,
                            tract_definition,
                            bedpostx_input,
                        })
                    })
                })
            })
        })
    }

    /// Configuration for these flags.
    pub fn select(&self) -> Result<ConfigId, UnsupportedCombination> {
        match TABLE.get(self) {
            Some(&Outcome::Config(id)) => Ok(ConfigId(id)),
            Some(&Outcome::Unsupported(reason)) => Err(UnsupportedCombination { reason }),
            None => Err(UnsupportedCombination {
                reason: "no rule covers this combination",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Config(&'static str),
    Unsupported(&'static str),
}

/// One table row; `None` matches any value.
struct Rule {
    bedpostx: bool,
    tract: TractDefinition,
    input: Option<InputType>,
    output: Option<OutputType>,
    dropout: Option<bool>,
    outcome: Outcome,
}

impl Rule {
    fn matches(&self, e: &Experiment) -> bool {
        self.bedpostx == e.bedpostx_input
            && self.tract == e.tract_definition
            && self.input.map_or(true, |v| v == e.input_type)
            && self.output.map_or(true, |v| v == e.output_type)
            && self.dropout.map_or(true, |v| v == e.dropout_sampling)
    }
}

const fn rule(
    bedpostx: bool,
    tract: TractDefinition,
    input: Option<InputType>,
    output: Option<OutputType>,
    dropout: Option<bool>,
    outcome: Outcome,
) -> Rule {
    Rule {
        bedpostx,
        tract,
        input,
        output,
        dropout,
        outcome,
    }
}

use InputType::{Peaks, T1};
use Outcome::{Config, Unsupported};
use OutputType::{DmRegression, EndingsSegmentation, Tom, TractSegmentation};
use TractDefinition::{AutoPtx, TractQuerierPlus};

#[rustfmt::skip]
const RULES: &[Rule] = &[
    // bedpostX peaks
    rule(true, TractQuerierPlus, Some(Peaks), Some(TractSegmentation), Some(true),
        Unsupported("bedpostX input in combination with uncertainty not supported")),
    rule(true, TractQuerierPlus, Some(Peaks), Some(TractSegmentation), Some(false),
        Config("TractSeg_BXTensAg")),
    rule(true, TractQuerierPlus, Some(Peaks), Some(EndingsSegmentation), None,
        Unsupported("bedpostX input in combination with output type endings_segmentation not supported")),
    rule(true, TractQuerierPlus, Some(Peaks), Some(Tom), None,
        Unsupported("bedpostX input in combination with output type TOM not supported")),
    rule(true, TractQuerierPlus, Some(Peaks), Some(DmRegression), None,
        Unsupported("bedpostX input in combination with output type dm_regression and tract definition TractQuerier+ not supported")),
    rule(true, TractQuerierPlus, Some(T1), None, None,
        Unsupported("bedpostX input in combination with input type T1 and tract definition TractQuerier+ not supported")),
    rule(true, AutoPtx, Some(Peaks), Some(TractSegmentation), Some(true),
        Unsupported("tract definition AutoPTX in combination with uncertainty not supported")),
    rule(true, AutoPtx, Some(Peaks), Some(TractSegmentation), Some(false),
        Config("TractSeg_All_BXTensAg_aPTX_platLR20")),
    rule(true, AutoPtx, Some(Peaks), Some(EndingsSegmentation), None,
        Unsupported("tract definition AutoPTX in combination with output type endings_segmentation not supported")),
    rule(true, AutoPtx, Some(Peaks), Some(Tom), None,
        Unsupported("tract definition AutoPTX in combination with output type TOM not supported")),
    rule(true, AutoPtx, Some(Peaks), Some(DmRegression), None,
        Config("DmReg_All_BXTensAg_aPTX_platLR20_noMiss")),
    rule(true, AutoPtx, Some(T1), None, None,
        Unsupported("bedpostX input in combination with input type T1 not supported")),
    // CSD peaks and T1
    rule(false, TractQuerierPlus, Some(Peaks), Some(TractSegmentation), Some(true),
        Config("TractSeg_12g90g270g_125mm_DS_DAugAll_Dropout")),
    rule(false, TractQuerierPlus, Some(Peaks), Some(TractSegmentation), Some(false),
        Config("TractSeg_12g90g270g_125mm_DS_DAugAll")),
    rule(false, TractQuerierPlus, Some(Peaks), Some(EndingsSegmentation), None,
        Config("EndingsSeg_12g90g270g_125mm_DS_DAugAll")),
    rule(false, TractQuerierPlus, Some(Peaks), Some(Tom), None,
        Config("Peaks_12g90g270g_125mm_DS_DAugAll")),
    rule(false, TractQuerierPlus, Some(Peaks), Some(DmRegression), None,
        Config("DmReg_12g90g270g_125mm_DAugAll")),
    rule(false, TractQuerierPlus, Some(T1), Some(TractSegmentation), None,
        Config("TractSeg_T1_125mm_DAugAll")),
    rule(false, TractQuerierPlus, Some(T1), Some(EndingsSegmentation), None,
        Config("EndingsSeg_12g90g270g_125mm_DAugAll")),
    rule(false, TractQuerierPlus, Some(T1), Some(Tom), None,
        Config("Peaks20_12g90g270g_125mm")),
    rule(false, TractQuerierPlus, Some(T1), Some(DmRegression), None,
        Unsupported("no pretrained model available for T1")),
    rule(false, AutoPtx, None, None, None,
        Unsupported("CSD input in combination with tract definition AutoPTX not yet supported")),
];

static TABLE: LazyLock<HashMap<Experiment, Outcome>> = LazyLock::new(|| {
    let table: HashMap<_, _> = Experiment::all()
        .filter_map(|e| RULES.iter().find(|r| r.matches(&e)).map(|r| (e, r.outcome)))
        .collect();
    debug_assert_eq!(table.len(), Experiment::all().count(), "rule table is not total");
    table
});

/// Flag combinations no rule covers. Empty when the table is total.
pub fn uncovered() -> Vec<Experiment> {
    Experiment::all().filter(|e| !TABLE.contains_key(e)).collect()
}

/// Pretrained configuration for an experiment.
///
/// # Example
///
/// ```
/// use tractcrop::experiment::{select, InputType, OutputType, TractDefinition};
///
/// let id = select(
///     InputType::Peaks,
///     OutputType::TractSegmentation,
///     false,
///     TractDefinition::TractQuerierPlus,
///     false,
/// )
/// .unwrap();
/// assert_eq!(id.as_str(), "TractSeg_12g90g270g_125mm_DS_DAugAll");
/// ```
pub fn select(
    input_type: InputType,
    output_type: OutputType,
    dropout_sampling: bool,
    tract_definition: TractDefinition,
    bedpostx_input: bool,
) -> Result<ConfigId, UnsupportedCombination> {
    Experiment {
        input_type,
        output_type,
        dropout_sampling,
        tract_definition,
        bedpostx_input,
    }
    .select()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_total() {
        assert_eq!(Experiment::all().count(), 64);
        assert!(uncovered().is_empty());
    }

    #[test]
    fn test_first_matching_rule_wins() {
        // Both the dropout row and the plain row mention tract_segmentation.
        let with_dropout = select(Peaks, TractSegmentation, true, TractQuerierPlus, false);
        assert_eq!(
            with_dropout.unwrap().as_str(),
            "TractSeg_12g90g270g_125mm_DS_DAugAll_Dropout"
        );
    }

    #[test]
    fn test_dropout_is_ignored_where_wildcarded() {
        for dropout in [false, true] {
            assert_eq!(
                select(T1, Tom, dropout, TractQuerierPlus, false).unwrap().as_str(),
                "Peaks20_12g90g270g_125mm"
            );
        }
    }

    #[test]
    fn test_bedpostx_dm_regression_with_tractquerier_is_unsupported() {
        let err = select(Peaks, DmRegression, false, TractQuerierPlus, true).unwrap_err();
        assert!(err.reason().contains("dm_regression"));
    }

    #[test]
    fn test_enum_strings_roundtrip() {
        for &v in OutputType::ALL {
            assert_eq!(v.as_str().parse::<OutputType>().unwrap(), v);
        }
        assert_eq!("TractQuerier+".parse::<TractDefinition>().unwrap(), TractQuerierPlus);
        assert_eq!(InputType::T1.to_string(), "T1");
    }

    #[test]
    fn test_unknown_string_is_configuration_error() {
        let err = "fodf".parse::<InputType>().unwrap_err();
        assert!(matches!(err, crate::Error::Configuration(_)));
        assert!(err.to_string().contains("peaks, T1"));
    }
}
