//! Command-line interface.

#![allow(missing_docs)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::SystemConfig;
use crate::experiment::{Experiment, InputType, OutputType, TractDefinition};
use crate::preprocess::{ChannelLayout, PreprocessConfig, DEFAULT_JOBS};
use crate::Result;

#[derive(Debug, Parser)]
#[command(
    name = "tractcrop",
    version,
    about = "Crop tract segmentation datasets to their nonzero bounding box"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Crop every subject of a dataset to the bounding box of its reference channel
    Preprocess(PreprocessArgs),
    /// Print the pretrained configuration for a set of experiment flags
    SelectConfig(SelectConfigArgs),
    /// Print the resolved directory layout
    ShowConfig,
}

#[derive(Debug, Args)]
pub struct PreprocessArgs {
    #[arg(long, help = "Dataset directory (default: <network_dir>/<dataset-folder>)")]
    pub source: Option<PathBuf>,

    #[arg(long, help = "Output directory (default: <data_path>/<preproc-folder>)")]
    pub target: Option<PathBuf>,

    #[arg(long, default_value = "data_training")]
    pub dataset_folder: String,

    #[arg(long, default_value = "data_preproc")]
    pub preproc_folder: String,

    #[arg(
        long = "data",
        value_name = "NAME",
        help = "Data channel, the first is the crop reference (repeatable; default: peaks, nodif_brain_mask)"
    )]
    pub data: Vec<String>,

    #[arg(
        long = "seg",
        value_name = "NAME",
        help = "Segmentation channel (repeatable; default: bundle_masks_AR)"
    )]
    pub seg: Vec<String>,

    #[arg(
        long = "subject",
        value_name = "ID",
        help = "Subject to process (repeatable; default: every subdirectory of the source)"
    )]
    pub subjects: Vec<String>,

    #[arg(long, default_value = "nii.gz")]
    pub extension: String,

    #[arg(long, default_value_t = DEFAULT_JOBS, help = "Number of worker threads")]
    pub jobs: usize,
}

impl PreprocessArgs {
    /// Build the run configuration, filling unset roots from `system`.
    pub fn to_config(&self, system: &SystemConfig) -> Result<PreprocessConfig> {
        let mut config = match &self.source {
            Some(source) => PreprocessConfig::new(
                source.clone(),
                system.data_path.join(&self.preproc_folder),
            ),
            None => PreprocessConfig::from_system(system, &self.dataset_folder, &self.preproc_folder)?,
        };
        if let Some(target) = &self.target {
            config.target_root = target.clone();
        }

        let defaults = ChannelLayout::default();
        config.layout = ChannelLayout {
            data: if self.data.is_empty() { defaults.data } else { self.data.clone() },
            segmentation: if self.seg.is_empty() { defaults.segmentation } else { self.seg.clone() },
            extension: self.extension.clone(),
        };
        config.jobs = self.jobs;
        config.layout.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct SelectConfigArgs {
    #[arg(long, value_enum)]
    pub input_type: InputTypeArg,

    #[arg(long, value_enum)]
    pub output_type: OutputTypeArg,

    #[arg(long, default_value_t = false)]
    pub dropout_sampling: bool,

    #[arg(long, value_enum, default_value_t = TractDefinitionArg::TractQuerierPlus)]
    pub tract_definition: TractDefinitionArg,

    #[arg(long, default_value_t = false)]
    pub bedpostx_input: bool,
}

impl SelectConfigArgs {
    pub fn to_experiment(&self) -> Experiment {
        Experiment {
            input_type: self.input_type.into(),
            output_type: self.output_type.into(),
            dropout_sampling: self.dropout_sampling,
            tract_definition: self.tract_definition.into(),
            bedpostx_input: self.bedpostx_input,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputTypeArg {
    #[value(name = "peaks")]
    Peaks,
    #[value(name = "T1")]
    T1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputTypeArg {
    #[value(name = "tract_segmentation")]
    TractSegmentation,
    #[value(name = "endings_segmentation")]
    EndingsSegmentation,
    #[value(name = "TOM")]
    Tom,
    #[value(name = "dm_regression")]
    DmRegression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TractDefinitionArg {
    #[value(name = "TractQuerier+")]
    TractQuerierPlus,
    #[value(name = "AutoPTX")]
    AutoPtx,
}

impl From<InputTypeArg> for InputType {
    fn from(arg: InputTypeArg) -> Self {
        match arg {
            InputTypeArg::Peaks => Self::Peaks,
            InputTypeArg::T1 => Self::T1,
        }
    }
}

impl From<OutputTypeArg> for OutputType {
    fn from(arg: OutputTypeArg) -> Self {
        match arg {
            OutputTypeArg::TractSegmentation => Self::TractSegmentation,
            OutputTypeArg::EndingsSegmentation => Self::EndingsSegmentation,
            OutputTypeArg::Tom => Self::Tom,
            OutputTypeArg::DmRegression => Self::DmRegression,
        }
    }
}

impl From<TractDefinitionArg> for TractDefinition {
    fn from(arg: TractDefinitionArg) -> Self {
        match arg {
            TractDefinitionArg::TractQuerierPlus => Self::TractQuerierPlus,
            TractDefinitionArg::AutoPtx => Self::AutoPtx,
        }
    }
}
