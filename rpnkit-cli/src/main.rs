use clap::Parser;
use rpnkit::{
    AnchorCache, AnchorGenerator, BoxCodec, BoxDelta, ContainmentFilterConfig, FpnAnchorConfig,
    FpnProposalConfig, FpnProposalMode, HierarchicalRpn, ImageShape, LevelPrediction,
    OverlapMetric, OverlapParams, ProposalConfig, ProposalSet, RpnConfig, RpnHead,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "rpnkit CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeConfig {
    Level,
    Joint,
}

impl From<ModeConfig> for FpnProposalMode {
    fn from(value: ModeConfig) -> Self {
        match value {
            ModeConfig::Level => FpnProposalMode::Level,
            ModeConfig::Joint => FpnProposalMode::Joint,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MetricConfig {
    Iou,
    Containment,
}

impl From<MetricConfig> for OverlapMetric {
    fn from(value: MetricConfig) -> Self {
        match value {
            MetricConfig::Iou => OverlapMetric::Iou,
            MetricConfig::Containment => OverlapMetric::Containment,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AnchorConfigJson {
    strides: Vec<u32>,
    sizes: Vec<f32>,
    ratios: Vec<f32>,
    max_size: u32,
}

impl Default for AnchorConfigJson {
    fn default() -> Self {
        let cfg = FpnAnchorConfig::default();
        Self {
            strides: cfg.levels.iter().map(|l| l.stride).collect(),
            sizes: cfg
                .levels
                .iter()
                .flat_map(|l| l.sizes.first().copied())
                .collect(),
            ratios: cfg.ratios,
            max_size: cfg.max_size,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct CodecConfigJson {
    delta_clamp: f32,
    weights: [f32; 4],
}

impl Default for CodecConfigJson {
    fn default() -> Self {
        let cfg = BoxCodec::default();
        Self {
            delta_clamp: cfg.delta_clamp,
            weights: cfg.weights,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ProposalConfigJson {
    mode: ModeConfig,
    per_level_topk: usize,
    pre_nms_topk: usize,
    post_nms_topk: usize,
    min_size: f32,
    nms_iou: f32,
}

impl Default for ProposalConfigJson {
    fn default() -> Self {
        let cfg = FpnProposalConfig::default();
        Self {
            mode: ModeConfig::Level,
            per_level_topk: cfg.per_level_topk,
            pre_nms_topk: cfg.proposals.pre_nms_topk,
            post_nms_topk: cfg.proposals.post_nms_topk,
            min_size: cfg.proposals.min_size,
            nms_iou: cfg.proposals.nms_iou,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FilterConfigJson {
    threshold: f32,
    metric: MetricConfig,
    chunk_rows: usize,
    parallel: bool,
}

impl Default for FilterConfigJson {
    fn default() -> Self {
        let cfg = ContainmentFilterConfig::default();
        Self {
            threshold: cfg.threshold,
            metric: MetricConfig::Containment,
            chunk_rows: cfg.overlap.chunk_rows,
            parallel: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    input_path: String,
    output_path: Option<String>,
    head: String,
    anchors: AnchorConfigJson,
    codec: CodecConfigJson,
    proposals: ProposalConfigJson,
    filter: FilterConfigJson,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: String::new(),
            output_path: None,
            head: RpnHead::default().name().to_string(),
            anchors: AnchorConfigJson::default(),
            codec: CodecConfigJson::default(),
            proposals: ProposalConfigJson::default(),
            filter: FilterConfigJson::default(),
        }
    }
}

impl Config {
    fn to_rpn_config(&self) -> Result<RpnConfig, Box<dyn std::error::Error>> {
        let anchors = FpnAnchorConfig::from_strides(
            &self.anchors.strides,
            &self.anchors.sizes,
            self.anchors.ratios.clone(),
            self.anchors.max_size,
        )?;
        let proposals = FpnProposalConfig {
            mode: self.proposals.mode.into(),
            per_level_topk: self.proposals.per_level_topk,
            proposals: ProposalConfig {
                pre_nms_topk: self.proposals.pre_nms_topk,
                post_nms_topk: self.proposals.post_nms_topk,
                min_size: self.proposals.min_size,
                nms_iou: self.proposals.nms_iou,
            },
        };
        let filter = ContainmentFilterConfig {
            threshold: self.filter.threshold,
            metric: self.filter.metric.into(),
            overlap: OverlapParams {
                chunk_rows: self.filter.chunk_rows,
                parallel: self.filter.parallel,
            },
        };
        Ok(RpnConfig {
            head: RpnHead::from_name(&self.head)?,
            anchors,
            codec: BoxCodec {
                delta_clamp: self.codec.delta_clamp,
                weights: self.codec.weights,
            },
            proposals,
            filter,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ImageJson {
    height: f32,
    width: f32,
}

#[derive(Debug, Deserialize)]
struct LevelJson {
    feature_height: usize,
    feature_width: usize,
    label_logits: Vec<f32>,
    box_deltas: Vec<[f32; 4]>,
}

impl From<LevelJson> for LevelPrediction {
    fn from(value: LevelJson) -> Self {
        Self {
            feature_h: value.feature_height,
            feature_w: value.feature_width,
            label_logits: value.label_logits,
            box_deltas: value.box_deltas.into_iter().map(BoxDelta::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Input {
    image: ImageJson,
    house: Vec<LevelJson>,
    #[serde(default)]
    damage: Vec<LevelJson>,
}

#[derive(Debug, Serialize)]
struct ProposalRecord {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

fn records(set: &ProposalSet) -> Vec<ProposalRecord> {
    set.iter()
        .map(|(b, score)| ProposalRecord {
            x1: b.x1,
            y1: b.y1,
            x2: b.x2,
            y2: b.y2,
            score,
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct Output {
    house: Vec<ProposalRecord>,
    damage: Vec<ProposalRecord>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("rpnkit=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.input_path.is_empty() {
        return Err("input_path must be set in the config".into());
    }
    let rpn_config = config.to_rpn_config()?;
    tracing::info!(
        head = rpn_config.head.name(),
        dilation = rpn_config.head.dilation(),
        levels = rpn_config.anchors.num_levels(),
        "loaded config"
    );

    let input_text = fs::read_to_string(&config.input_path)?;
    let input: Input = serde_json::from_str(&input_text)?;
    let image = ImageShape::new(input.image.height, input.image.width);
    let house: Vec<LevelPrediction> = input.house.into_iter().map(Into::into).collect();
    let damage: Vec<LevelPrediction> = input.damage.into_iter().map(Into::into).collect();

    let rpn = HierarchicalRpn::new(AnchorGenerator::new(Arc::new(AnchorCache::new())), rpn_config)?;
    let output = if damage.is_empty() {
        let house = rpn.propose(&house, image)?;
        Output {
            house: records(&house),
            damage: Vec::new(),
        }
    } else {
        let nested = rpn.run(&house, &damage, image)?;
        Output {
            house: records(&nested.house),
            damage: records(&nested.damage),
        }
    };
    tracing::info!(
        house = output.house.len(),
        damage = output.damage.len(),
        "proposals written"
    );

    let json = serde_json::to_string_pretty(&output)?;
    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
