//! Small helper that lets an async call record its own wall-clock
//! duration into an OpenTelemetry histogram without threading a
//! stopwatch through every call site.
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::Instant;

use opentelemetry::{metrics::Histogram, Context};
use pin_project_lite::pin_project;

pin_project! {
	pub struct BoundRecordDuration<'a, F> {
		#[pin]
		inner: F,
		histogram: &'a Histogram<f64>,
		start: Instant,
	}
}

impl<'a, F: Future> Future for BoundRecordDuration<'a, F> {
	type Output = F::Output;

	fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
		let this = self.project();
		match this.inner.poll(cx) {
			Poll::Ready(v) => {
				this.histogram
					.record(&Context::current(), this.start.elapsed().as_secs_f64(), &[]);
				Poll::Ready(v)
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

pub trait RecordDuration: Future + Sized {
	fn bound_record_duration(self, histogram: &Histogram<f64>) -> BoundRecordDuration<'_, Self> {
		BoundRecordDuration {
			inner: self,
			histogram,
			start: Instant::now(),
		}
	}
}

impl<F: Future> RecordDuration for F {}
