use serde::{Deserialize, Serialize};

use crate::ir::NodeType;
use crate::layout::{LayoutError, LayoutResult};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] json5::Error),
    #[error("config encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] LayoutError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStrategy {
    /// Replay an explicit ordinal to id-list mapping.
    Assignment,
    /// Topological depth buckets.
    Sort,
    /// First expression time.
    Time,
    /// Case-insensitive node name.
    Alpha,
    /// Input-set clustering.
    Inputs,
    /// Source degree ordering.
    SourceOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub cell_width: f32,
    pub cell_height: f32,
    /// Width of the vertical channel on the left of each cell.
    pub channel_width: f32,
    /// Height of the horizontal channel at the top of each cell.
    pub channel_height: f32,
    pub lane_spacing: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_width: 160.0,
            cell_height: 120.0,
            channel_width: 60.0,
            channel_height: 60.0,
            lane_spacing: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub grid_size: f32,
    pub trace_offset: f32,
    pub node_width: f32,
    pub node_height: f32,
    pub bubble_size: f32,
    pub cluster_spacing: f32,
    pub row_gap: f32,
    pub min_row_gap: f32,
    pub compress_rows: bool,
    pub max_row_size: usize,
    pub chunked: bool,
    pub use_batteries: bool,
    pub row_strategy: RowStrategy,
    pub bubble_types: Vec<NodeType>,
    pub grid: GridConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            grid_size: 10.0,
            trace_offset: 10.0,
            node_width: 60.0,
            node_height: 40.0,
            bubble_size: 20.0,
            cluster_spacing: 40.0,
            row_gap: 40.0,
            min_row_gap: 20.0,
            compress_rows: false,
            max_row_size: 6,
            chunked: false,
            use_batteries: true,
            row_strategy: RowStrategy::Sort,
            bubble_types: vec![NodeType::Bubble, NodeType::Slash, NodeType::Intercell],
            grid: GridConfig::default(),
        }
    }
}

impl LayoutConfig {
    /// Parses a JSON (or JSON5) document; missing keys keep their defaults.
    pub fn from_json5(input: &str) -> Result<Self, ConfigError> {
        let config: LayoutConfig = json5::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> LayoutResult<()> {
        if !(self.grid_size > 0.0) {
            return Err(LayoutError::invalid(format!(
                "grid_size must be positive, got {}",
                self.grid_size
            )));
        }
        if self.max_row_size == 0 {
            return Err(LayoutError::invalid("max_row_size must be at least 1"));
        }
        let aligned = [
            ("trace_offset", self.trace_offset),
            ("node_width", self.node_width),
            ("node_height", self.node_height),
            ("bubble_size", self.bubble_size),
            ("cluster_spacing", self.cluster_spacing),
            ("row_gap", self.row_gap),
            ("min_row_gap", self.min_row_gap),
            ("grid.cell_width", self.grid.cell_width),
            ("grid.cell_height", self.grid.cell_height),
            ("grid.channel_width", self.grid.channel_width),
            ("grid.channel_height", self.grid.channel_height),
            ("grid.lane_spacing", self.grid.lane_spacing),
        ];
        for (name, value) in aligned {
            if !(value > 0.0) || !self.on_grid(value) {
                return Err(LayoutError::invalid(format!(
                    "{name} must be a positive multiple of grid_size {}, got {value}",
                    self.grid_size
                )));
            }
        }
        // Out pads sit at mid height and must land on the grid too.
        if !self.on_grid(self.node_height / 2.0) {
            return Err(LayoutError::invalid(
                "node_height must be an even multiple of grid_size",
            ));
        }
        if self.min_row_gap > self.row_gap {
            return Err(LayoutError::invalid("min_row_gap exceeds row_gap"));
        }
        if self.grid.channel_width >= self.grid.cell_width
            || self.grid.channel_height >= self.grid.cell_height
        {
            return Err(LayoutError::invalid("grid channels must be smaller than cells"));
        }
        Ok(())
    }

    pub fn on_grid(&self, value: f32) -> bool {
        let cells = value / self.grid_size;
        (cells - cells.round()).abs() < 1e-4
    }

    pub fn snap(&self, value: f32) -> f32 {
        (value / self.grid_size).round() * self.grid_size
    }

    pub fn is_bubble_type(&self, node_type: NodeType) -> bool {
        self.bubble_types.contains(&node_type)
    }
}
