use thiserror::Error;

/// Rejected solver configuration. Raised once at construction, never while stepping.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("the fluid needs at least one particle")]
    NoParticles,
    #[error("{count} particles exceed the grid's u32 index range")]
    TooManyParticles { count: usize },
    #[error("{name} must be positive and finite, got {value}")]
    NotPositive { name: &'static str, value: f32 },
    #[error("{name} must be non-negative and finite, got {value}")]
    Negative { name: &'static str, value: f32 },
    #[error("boundary restitution must lie in [0, 1], got {0}")]
    Restitution(f32),
    #[error("at least one sub-step per tick is required")]
    NoSubsteps,
    #[error("grid cells need a capacity of at least one particle")]
    NoCellCapacity,
    #[error("a cell capacity of {0} exceeds the grid's u32 slot range")]
    CellCapacityTooLarge(usize),
    #[error("a {cells_x}x{cells_y} grid has too many cells to index")]
    GridTooLarge { cells_x: u32, cells_y: u32 },
    #[error("cell size {cell_size} is smaller than the smoothing radius {smoothing_radius}")]
    CellTooSmall { cell_size: f32, smoothing_radius: f32 },
    #[error("gravity must be finite, got {0:?}")]
    Gravity([f32; 2]),
}
