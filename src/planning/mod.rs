//! Time/flow estimation, fan/preheat scheduling, and coasting/back-pressure
//! post-processing (spec C8/C9): the passes that run over a finished
//! `LayerPlan` before it is handed to a g-code writer.

pub mod post_process;
pub mod preheat;
pub mod time_estimator;
