//! Signal analysis: the analyzer, the bundle it produces, the rescoring filter
//! and the advanced indicator set.

pub mod advanced;
pub mod analyzer;
pub mod bundle;
pub mod filter;

pub use advanced::{
    AdvancedIndicators, AdxSignal, CrossSignal, MaCross, Momentum, MomentumDirection,
    StochasticSignal, StochasticZone, SupportResistance, TrendStrength, Volatility,
};
pub use analyzer::{AnalysisError, Analyzer, AnalyzerConfig};
pub use bundle::{
    composite_score, Analysis, Direction, FibLevel, FibonacciSignal, IndicatorBundle, MacdSignal,
    SignalSet, Trend, BASELINE_SCORE,
};
pub use filter::{filter, filter_bundle};
