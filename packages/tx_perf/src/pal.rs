// Platform abstraction layer for the benchmark runner.
//
// Thread creation and time measurement go through these traits so that tests can inject
// spawn failures and scripted clock readings. The structure follows the abstraction (trait),
// facade (enum), real implementation split used throughout this workspace.

mod abstractions;
mod build_target;
mod facade;

pub(crate) use abstractions::*;
pub(crate) use build_target::*;
pub(crate) use facade::*;
