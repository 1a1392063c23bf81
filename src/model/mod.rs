pub mod sct;
pub mod seaformer;

use burn::prelude::*;
use image::{
    RgbImage,
    imageops::{self, FilterType},
};

use crate::error::{Result, SeaFormerError};
use sct::{SctSea, SctSeaConfig};
use seaformer::{ForwardMode, SeaFormer, SeaFormerConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentationModelKind {
    SeaFormer,
    SctSea,
}

impl SegmentationModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SegmentationModelKind::SeaFormer => "seaformer",
            SegmentationModelKind::SctSea => "sct-sea",
        }
    }
}

#[derive(Clone, Debug)]
pub enum AnySegmentationModel<B: Backend> {
    SeaFormer(SeaFormer<B>),
    SctSea(SctSea<B>),
}

impl<B: Backend> AnySegmentationModel<B> {
    /// Builds the default preset of `kind`.
    pub fn new(kind: SegmentationModelKind, device: &B::Device) -> Result<Self> {
        match kind {
            SegmentationModelKind::SeaFormer => {
                SeaFormerConfig::base().init(device).map(Self::SeaFormer)
            }
            SegmentationModelKind::SctSea => {
                SctSeaConfig::default().init(device).map(Self::SctSea)
            }
        }
    }

    pub fn kind(&self) -> SegmentationModelKind {
        match self {
            Self::SeaFormer(_) => SegmentationModelKind::SeaFormer,
            Self::SctSea(_) => SegmentationModelKind::SctSea,
        }
    }

    pub fn as_seaformer(&self) -> Option<&SeaFormer<B>> {
        if let Self::SeaFormer(model) = self {
            Some(model)
        } else {
            None
        }
    }

    pub fn as_sct_sea(&self) -> Option<&SctSea<B>> {
        if let Self::SctSea(model) = self {
            Some(model)
        } else {
            None
        }
    }

    /// Class logits `(B, num_classes, H', W')`. SeaFormer logits match the
    /// input resolution; SctSea logits match its configured output size.
    pub fn segment(&self, x: Tensor<B, 4>, mode: ForwardMode) -> Result<Tensor<B, 4>> {
        match self {
            Self::SeaFormer(model) => model.segment(x, mode).ok_or_else(|| {
                SeaFormerError::config("SeaFormer was built without a segmentation head")
            }),
            Self::SctSea(model) => Ok(model.forward(x, mode)),
        }
    }

    /// Square input resolution the model expects, if it has one.
    pub fn preferred_input_resolution(&self) -> Option<usize> {
        match self {
            Self::SeaFormer(_) => None,
            Self::SctSea(model) => {
                let [height, width] = model.output_size();
                (height == width).then_some(height)
            }
        }
    }

    pub fn prepare_input_image(&self, image: &RgbImage) -> Result<PreparedModelImage> {
        match self.preferred_input_resolution() {
            Some(target) => prepare_square_image(image, target),
            None => Ok(PreparedModelImage {
                width: image.width() as usize,
                height: image.height() as usize,
                rgb: image.clone(),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PreparedModelImage {
    pub width: usize,
    pub height: usize,
    pub rgb: RgbImage,
}

/// Resizes `image` to `target x target`, ignoring its aspect ratio.
pub fn prepare_square_image(image: &RgbImage, target: usize) -> Result<PreparedModelImage> {
    if target == 0 {
        return Err(SeaFormerError::input(
            "square resize requires a non-zero target resolution",
        ));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(SeaFormerError::input("cannot resize an empty image"));
    }

    let rgb = if image.width() as usize == target && image.height() as usize == target {
        image.clone()
    } else {
        imageops::resize(image, target as u32, target as u32, FilterType::Triangle)
    };

    Ok(PreparedModelImage {
        width: target,
        height: target,
        rgb,
    })
}
