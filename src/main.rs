use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as AnyhowContext, Result};
use clap::Parser;

use indicatif::ProgressStyle;
use tracing::{info, info_span, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::filter::LevelFilter;

use boxtrack_rust::bounding_box::BoundingBox;
use boxtrack_rust::config::*;
use boxtrack_rust::dataset::*;
use boxtrack_rust::my_types::*;
use boxtrack_rust::synthetic::SyntheticVideo;
use boxtrack_rust::tracker::ObjectsTracker;
use boxtrack_rust::video::VideoSource;

#[derive(Parser)]
pub struct Args {
    /// folder with data.jsonl and the frames it lists
    #[clap(short, long)]
    pub input_folder: Option<String>,
    /// play a generated video instead
    #[clap(long)]
    pub synthetic: bool,
    /// JSON lines output, stdout when missing
    #[clap(long)]
    pub output: Option<PathBuf>,
    #[clap(flatten)]
    pub config: Config,
}

/// A textured rectangle drifting over a noise background, with its inner part
/// annotated on the first frame.
fn synthetic_input(config: &Config) -> (Box<dyn VideoSource>, Vec<GroundTruth>) {
    let video = SyntheticVideo::new(320, 240, 5., config.seed).with_sprite(
        Vector2d::new(40., 60.),
        120,
        90,
        Vector2d::new(30., 8.),
        config.seed.wrapping_add(1),
    );
    let ground_truth = video
        .sprite_box(0.)
        .map(|sprite| GroundTruth {
            object: ObjectId(0),
            time: 0.,
            bbox: Some(BoundingBox::new(
                sprite.x + 20.,
                sprite.y + 20.,
                sprite.width - 40.,
                sprite.height - 40.,
            )),
        })
        .into_iter()
        .collect();
    (Box::new(video), ground_truth)
}

fn main() -> Result<()> {
    // parse the config
    let args = Args::parse();
    let config = args.config.clone();
    if config.fps <= 0. || config.playback_rate <= 0. {
        bail!("fps and playback rate must be positive");
    }

    // setup logging
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .with(LevelFilter::INFO)
        .init();

    let (source, ground_truth) = if args.synthetic {
        synthetic_input(&config)
    } else if let Some(folder) = &args.input_folder {
        let dataset = Dataset::new(Path::new(folder), config.fps)?;
        let source: Box<dyn VideoSource> = Box::new(dataset.frames);
        (source, dataset.ground_truth)
    } else {
        bail!("Pass an input folder with -i or use --synthetic");
    };

    let mut output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    let mut tracker = ObjectsTracker::new(config.clone());
    tracker.load(source);
    for gt in ground_truth {
        tracker.set_ground_truth(gt.object, gt.time, gt.bbox);
    }

    let duration = tracker.frames().duration();
    let step = config.playback_rate / config.fps;
    let ticks = (duration / step).ceil() as u64;

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    header_span.pb_set_length(ticks);
    let header_span_enter = header_span.enter();

    for tick in 0..ticks {
        tracker.frames_mut().seek(tick as f64 * step)?;
        if tracker.frames_mut().capture().is_none() {
            warn!("No frame at {:.3}s", tracker.frames().position());
        }
        let objects = tracker.get_objects(tracker.frames().position())?;
        serde_json::to_writer(&mut output, &objects)?;
        writeln!(output)?;
        header_span.pb_inc(1);
    }
    output.flush()?;

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    let stats = tracker.stats();
    info!(
        "{} ticks, {} flow steps, {} flow initialisations",
        ticks, stats.flow_tracks, stats.flow_inits
    );

    Ok(())
}
