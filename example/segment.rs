#![recursion_limit = "256"]

use std::{env, fs, path::PathBuf};

use burn::{backend::NdArray, prelude::*};
use burn_seaformer::{
    inference::segment_from_rgb,
    model::{AnySegmentationModel, SegmentationModelKind},
};

type InferenceBackend = NdArray<f32>;

const PALETTE: [[u8; 3]; 4] = [[0, 0, 0], [230, 25, 75], [60, 180, 75], [0, 130, 200]];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let image_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("assets/image/test.jpg"));
    let kind = match env::args().nth(2).as_deref() {
        Some("sct-sea") => SegmentationModelKind::SctSea,
        _ => SegmentationModelKind::SeaFormer,
    };

    let device = <InferenceBackend as Backend>::Device::default();
    let model = AnySegmentationModel::<InferenceBackend>::new(kind, &device)?;

    let image = image::open(&image_path)
        .map_err(|err| format!("Failed to load image `{}`: {err}", image_path.display()))?
        .to_rgb8();
    let prepared = model.prepare_input_image(&image)?;

    let classes = segment_from_rgb::<InferenceBackend>(
        &model,
        prepared.rgb.as_raw(),
        prepared.width,
        prepared.height,
        &device,
    )?;
    let [batch, height, width] = classes.dims();
    if batch != 1 {
        return Err(format!("Example expects batch size of 1, got {batch}.").into());
    }

    let values = classes
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|err| format!("Failed to read class map: {err:?}"))?;
    let pixels: Vec<u8> = values
        .iter()
        .flat_map(|&class| PALETTE[class.rem_euclid(PALETTE.len() as i64) as usize])
        .collect();

    let mask = image::RgbImage::from_vec(width as u32, height as u32, pixels)
        .ok_or_else(|| format!("Class map size mismatch {height}x{width}"))?;
    let output_path = image_path.with_file_name(format!("test_{}.png", kind.as_str()));
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    mask.save(&output_path)?;

    println!("model: {}", kind.as_str());
    println!("class map: {height}x{width}");
    println!("Saved class map to {}", output_path.display());

    Ok(())
}
