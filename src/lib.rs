pub mod config;
pub mod ir;
pub mod layout;
pub mod layout_dump;

pub use config::{GridConfig, LayoutConfig, RowStrategy};
pub use ir::{GeneCluster, Graph, NodeType, TimeCourse, TimeCourseTable};
pub use layout::{
    AlwaysContinue, LayoutError, LayoutResult, ProgressMonitor, compute_rows,
    compute_stacked_layout, layout_graph, route_grid,
};
pub use layout_dump::LayoutDump;
