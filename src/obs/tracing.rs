// self
use crate::{_prelude::*, obs::CommandKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCommand<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCommand<F> = F;

/// A span builder used by the dispatcher and controllers.
#[derive(Clone, Debug)]
pub struct CommandSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CommandSpan {
	/// Creates a new span tagged with the provided command kind + stage.
	pub fn new(kind: CommandKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("token_engine.command", command = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> CommandSpanGuard {
		#[cfg(feature = "tracing")]
		{
			CommandSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			CommandSpanGuard {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCommand<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// RAII guard returned by [`CommandSpan::entered`].
pub struct CommandSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for CommandSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("CommandSpanGuard(..)")
	}
}

/// Logs a continuation that matched no waiting command.
pub fn warn_unmatched_continuation(correlation_id: Uuid) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		correlation_id = %correlation_id,
		"Discarding authorization continuation with no waiting command.",
	);
	#[cfg(not(feature = "tracing"))]
	{
		let _ = correlation_id;
	}
}
