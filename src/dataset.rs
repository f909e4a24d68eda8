use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use log::{info, warn};

use crate::bounding_box::BoundingBox;
use crate::my_types::*;
use crate::video::ImageSequence;

/// A ground truth box from the dataset, None meaning "not visible"
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruth {
    pub object: ObjectId,
    pub time: f64,
    pub bbox: Option<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq)]
enum Record {
    Frame { time: f64, path: PathBuf },
    GroundTruth(GroundTruth),
}

/// A folder with image frames and a `data.jsonl` listing them along with the
/// ground truth boxes.
pub struct Dataset {
    pub frames: ImageSequence,
    pub ground_truth: Vec<GroundTruth>,
}

impl Dataset {
    pub fn new(path: &Path, fps: f64) -> Result<Dataset> {
        let file = File::open(path.join("data.jsonl"))
            .with_context(|| format!("Failed to open data.jsonl in {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        let mut frames = vec![];
        let mut ground_truth = vec![];

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Err(err) => bail!("Failed to read line {}", err),
                _ => {}
            }
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line)? {
                Some(Record::Frame { time, path: frame }) => frames.push((time, path.join(frame))),
                Some(Record::GroundTruth(gt)) => ground_truth.push(gt),
                None => warn!("Unrecognised data format {}", line.trim_end()),
            }
        }

        info!(
            "Loaded {} frames and {} ground truth boxes from {}",
            frames.len(),
            ground_truth.len(),
            path.display()
        );
        Ok(Dataset {
            frames: ImageSequence::new(frames, fps),
            ground_truth,
        })
    }

    /// Playback length in frames
    pub fn length(&self) -> u64 {
        self.frames.len() as u64
    }
}

fn parse_line(line: &str) -> Result<Option<Record>> {
    let value: serde_json::Value = serde_json::from_str(line)
        .context(format!("JSON deserialization failed for line: {}", line))?;
    let value = value.as_object().ok_or(anyhow!("JSON line is not a map"))?;

    if let Some(gt) = value.get("groundTruth") {
        let object = gt["object"]
            .as_u64()
            .ok_or(anyhow!("Ground truth object is not an id"))?;
        let time = gt["time"].as_f64().ok_or(anyhow!("Time is not a number"))?;
        let bbox = match gt.get("box") {
            None | Some(serde_json::Value::Null) => None,
            Some(bbox) => Some(
                serde_json::from_value::<BoundingBox>(bbox.clone())
                    .context("Invalid ground truth box")?,
            ),
        };
        return Ok(Some(Record::GroundTruth(GroundTruth {
            object: ObjectId(object as usize),
            time,
            bbox,
        })));
    }

    if let Some(frame) = value.get("frame") {
        let time = value
            .get("time")
            .and_then(|time| time.as_f64())
            .ok_or(anyhow!("Time is not a number"))?;
        let path = frame.as_str().ok_or(anyhow!("Frame path is not a string"))?;
        return Ok(Some(Record::Frame {
            time,
            path: PathBuf::from(path),
        }));
    }

    Ok(None)
}
