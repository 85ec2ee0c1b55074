use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::renderer::PipelineMatch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "BatchSettings::default_max_materials")]
    pub max_materials: u32,
    #[serde(default = "BatchSettings::default_max_instances")]
    pub max_instances: u32,
    #[serde(default = "BatchSettings::default_initial_pool_capacity")]
    pub initial_pool_capacity: usize,
    #[serde(default = "BatchSettings::default_sample_count")]
    pub sample_count: u32,
    #[serde(default)]
    pub color_format: ColorFormatSetting,
    #[serde(default = "BatchSettings::default_depth_test")]
    pub depth_test: bool,
    #[serde(default)]
    pub cull_mode: CullModeSetting,
    #[serde(default)]
    pub pipeline_match: PipelineMatch,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_materials: Self::default_max_materials(),
            max_instances: Self::default_max_instances(),
            initial_pool_capacity: Self::default_initial_pool_capacity(),
            sample_count: Self::default_sample_count(),
            color_format: ColorFormatSetting::default(),
            depth_test: Self::default_depth_test(),
            cull_mode: CullModeSetting::default(),
            pipeline_match: PipelineMatch::default(),
        }
    }
}

impl BatchSettings {
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<BatchSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded batch settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default batch settings.",
                        path, err
                    );
                    BatchSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Batch settings file {:?} not found. Using default settings.",
                    path
                );
                BatchSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default batch settings.",
                    path, err
                );
                BatchSettings::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.max_materials == 0 {
            warn!("max_materials must be greater than zero. Using default value.");
            self.max_materials = Self::default_max_materials();
        }

        if self.max_instances == 0 {
            warn!("max_instances must be greater than zero. Using default value.");
            self.max_instances = Self::default_max_instances();
        }

        if !matches!(self.sample_count, 1 | 2 | 4 | 8) {
            warn!(
                "Sample count {} is not one of 1, 2, 4 or 8. Using 1 instead.",
                self.sample_count
            );
            self.sample_count = Self::default_sample_count();
        }

        if self.pipeline_match == PipelineMatch::Coarse {
            warn!("Coarse pipeline matching can share pipelines between different specs.");
        }

        self
    }

    const fn default_max_materials() -> u32 {
        256
    }

    const fn default_max_instances() -> u32 {
        4096
    }

    const fn default_initial_pool_capacity() -> usize {
        1000
    }

    const fn default_sample_count() -> u32 {
        1
    }

    const fn default_depth_test() -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorFormatSetting {
    #[default]
    Bgra8UnormSrgb,
    Rgba8UnormSrgb,
    Rgba16Float,
}

impl ColorFormatSetting {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            ColorFormatSetting::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            ColorFormatSetting::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            ColorFormatSetting::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullModeSetting {
    #[default]
    Back,
    Front,
    None,
}

impl CullModeSetting {
    pub fn to_wgpu(self) -> Option<wgpu::Face> {
        match self {
            CullModeSetting::Back => Some(wgpu::Face::Back),
            CullModeSetting::Front => Some(wgpu::Face::Front),
            CullModeSetting::None => None,
        }
    }
}
