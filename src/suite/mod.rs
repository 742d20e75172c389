//! The scenario battery.
//!
//! Three families of scenarios run against any [`Factory`]:
//!
//! - [`clean`]: `clean` really resets the store.
//! - [`args`]: every calling convention yields a working handle whose chain
//!   reaches the expected backend kind.
//! - [`options`]: per-call options win over factory defaults.
//!
//! Each scenario produces a [`Report`]. [`run_all`] runs the whole battery
//! and hands the reports to a [`Sink`] as they complete. Scenarios never
//! panic on a misbehaving factory; every failure ends up in a report.

mod args;
mod clean;
mod options;
mod report;

#[cfg(test)]
mod tests;

use tracing::info;

pub use args::{args, with_callback, with_options, with_options_and_callback, without_arguments};
pub use clean::clean;
pub use options::{options, options_with};
pub use report::{Assert, Collector, Outcome, Report, Sink, Summary, TracingSink};

use crate::encoding::ObjectCoercion;
use crate::factory::Factory;

/// Runs every scenario against `factory`, expecting its chains to bottom
/// out in a backend of kind `expected_kind`.
pub async fn run_all(factory: &dyn Factory, expected_kind: &str, sink: &mut dyn Sink) -> Summary {
    run_all_with(factory, expected_kind, &ObjectCoercion::default(), sink).await
}

/// [`run_all`] for factories whose `utf8` codec renders objects with
/// `coercion` instead of the default placeholder.
pub async fn run_all_with(
    factory: &dyn Factory,
    expected_kind: &str,
    coercion: &ObjectCoercion,
    sink: &mut dyn Sink,
) -> Summary {
    info!(expected_kind, ?coercion, "running conformance suite");
    let mut summary = Summary::default();

    let mut emit = |report: Report| {
        summary.record(&report);
        sink.report(&report);
    };

    emit(clean(factory).await);
    for report in args(factory, expected_kind).await {
        emit(report);
    }
    emit(options_with(factory, coercion).await);

    info!(
        passed = summary.passed,
        failed = summary.failed,
        "conformance suite finished"
    );
    summary
}
