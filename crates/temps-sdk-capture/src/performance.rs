//! Web-vitals capture
//!
//! [`WebVitalsTracker`] turns raw timeline entries into metric reports:
//!
//! | Metric | Source entry | Reported |
//! |--------|--------------|----------|
//! | `CLS`  | layout-shift without recent input | running total, on every qualifying shift |
//! | `LCP`  | largest-contentful-paint | latest value, superseding earlier ones |
//! | `FCP`  | `first-contentful-paint` paint | once per page view |
//! | `FID`  | first-input | `processing_start - start_time`, once per page view |
//! | `TTFB` | navigation | `response_start - request_start`, once per page view |
//! | `INP`  | interaction | when a slower interaction is seen |

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::json;
use temps_sdk::{BoxError, EventContext, Plugin, PluginContext};
use tracing::debug;

use crate::host::{HostSignal, ListenerId, PerformanceEntry, SignalHub, SignalKind};

pub const CLS: &str = "CLS";
pub const LCP: &str = "LCP";
pub const FCP: &str = "FCP";
pub const FID: &str = "FID";
pub const TTFB: &str = "TTFB";
pub const INP: &str = "INP";

const FIRST_CONTENTFUL_PAINT: &str = "first-contentful-paint";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VitalReport {
    pub metric: &'static str,
    pub value: f64,
}

/// Per-page-view metric accumulator
#[derive(Debug, Clone, Default)]
pub struct WebVitalsTracker {
    cumulative_layout_shift: f64,
    largest_contentful_paint: Option<f64>,
    first_contentful_paint: Option<f64>,
    first_input_delay: Option<f64>,
    time_to_first_byte: Option<f64>,
    slowest_interaction: Option<f64>,
}

impl WebVitalsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new page view
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn cumulative_layout_shift(&self) -> f64 {
        self.cumulative_layout_shift
    }

    pub fn largest_contentful_paint(&self) -> Option<f64> {
        self.largest_contentful_paint
    }

    /// Fold one entry in; returns the report it triggers, if any
    pub fn observe(&mut self, entry: &PerformanceEntry) -> Option<VitalReport> {
        match entry {
            PerformanceEntry::LayoutShift {
                value,
                had_recent_input,
            } => {
                if *had_recent_input {
                    return None;
                }
                self.cumulative_layout_shift += value;
                Some(VitalReport {
                    metric: CLS,
                    value: self.cumulative_layout_shift,
                })
            }
            PerformanceEntry::LargestContentfulPaint { start_time } => {
                self.largest_contentful_paint = Some(*start_time);
                Some(VitalReport {
                    metric: LCP,
                    value: *start_time,
                })
            }
            PerformanceEntry::Paint { name, start_time } => {
                if name != FIRST_CONTENTFUL_PAINT || self.first_contentful_paint.is_some() {
                    return None;
                }
                self.first_contentful_paint = Some(*start_time);
                Some(VitalReport {
                    metric: FCP,
                    value: *start_time,
                })
            }
            PerformanceEntry::FirstInput {
                start_time,
                processing_start,
            } => {
                if self.first_input_delay.is_some() {
                    return None;
                }
                let delay = processing_start - start_time;
                self.first_input_delay = Some(delay);
                Some(VitalReport {
                    metric: FID,
                    value: delay,
                })
            }
            PerformanceEntry::Navigation {
                request_start,
                response_start,
            } => {
                if self.time_to_first_byte.is_some() {
                    return None;
                }
                let ttfb = response_start - request_start;
                self.time_to_first_byte = Some(ttfb);
                Some(VitalReport {
                    metric: TTFB,
                    value: ttfb,
                })
            }
            PerformanceEntry::Interaction { duration, .. } => {
                if self
                    .slowest_interaction
                    .is_some_and(|slowest| *duration <= slowest)
                {
                    return None;
                }
                self.slowest_interaction = Some(*duration);
                Some(VitalReport {
                    metric: INP,
                    value: *duration,
                })
            }
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    url: Option<String>,
    tracker: WebVitalsTracker,
}

struct Installed {
    performance_listener: ListenerId,
    page_view_listener: ListenerId,
}

/// Reports web vitals from the hub's performance entries
pub struct PerformanceCapture {
    hub: Arc<SignalHub>,
    page: Arc<Mutex<PageState>>,
    installed: Mutex<Option<Installed>>,
}

impl PerformanceCapture {
    pub const NAME: &'static str = "performance-capture";

    pub fn new(hub: Arc<SignalHub>) -> Self {
        Self {
            hub,
            page: Arc::new(Mutex::new(PageState::default())),
            installed: Mutex::new(None),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Snapshot of the current page view's accumulators
    pub fn tracker(&self) -> WebVitalsTracker {
        self.page
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tracker
            .clone()
    }
}

impl Plugin for PerformanceCapture {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&self, context: &PluginContext) -> Result<(), BoxError> {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        if installed.is_some() {
            return Err("performance capture is already installed".into());
        }

        let client = context.downgrade();
        let page = self.page.clone();
        let performance_listener = self.hub.add_listener(
            SignalKind::Performance,
            Arc::new(move |signal: &HostSignal| {
                let HostSignal::Performance(entry) = signal else {
                    return;
                };
                // Observe under the lock, capture outside it
                let (report, url) = {
                    let mut page = page.lock().unwrap_or_else(PoisonError::into_inner);
                    (page.tracker.observe(entry), page.url.clone())
                };
                let (Some(report), Some(client)) = (report, client.upgrade()) else {
                    return;
                };

                let mut context = EventContext::new();
                if let Some(url) = url {
                    context.insert("page".to_string(), json!(url));
                }
                client.capture_performance(report.metric, report.value, Some(context));
            }),
        );

        let page = self.page.clone();
        let page_view_listener = self.hub.add_listener(
            SignalKind::PageView,
            Arc::new(move |signal: &HostSignal| {
                if let HostSignal::PageView { url } = signal {
                    let mut page = page.lock().unwrap_or_else(PoisonError::into_inner);
                    page.tracker.reset();
                    page.url = Some(url.clone());
                    debug!(url = %url, "Page view started, web vitals reset");
                }
            }),
        );

        *installed = Some(Installed {
            performance_listener,
            page_view_listener,
        });
        debug!("Performance capture installed");
        Ok(())
    }

    fn cleanup(&self) {
        if let Some(installed) = self
            .installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.hub.remove_listener(installed.performance_listener);
            self.hub.remove_listener(installed.page_view_listener);
            debug!("Performance capture removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shift(value: f64, had_recent_input: bool) -> PerformanceEntry {
        PerformanceEntry::LayoutShift {
            value,
            had_recent_input,
        }
    }

    #[test]
    fn test_layout_shift_reports_running_total() {
        let mut tracker = WebVitalsTracker::new();

        let reports: Vec<f64> = [0.01, 0.02, 0.005]
            .into_iter()
            .filter_map(|value| tracker.observe(&shift(value, false)))
            .map(|report| report.value)
            .collect();

        assert_eq!(reports.len(), 3);
        assert!((reports[2] - 0.035).abs() < 1e-9);
        assert!((tracker.cumulative_layout_shift() - 0.035).abs() < 1e-9);
    }

    #[test]
    fn test_layout_shift_after_input_is_ignored() {
        let mut tracker = WebVitalsTracker::new();
        tracker.observe(&shift(0.1, false));

        assert_eq!(tracker.observe(&shift(0.5, true)), None);
        assert!((tracker.cumulative_layout_shift() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_largest_contentful_paint_supersedes() {
        let mut tracker = WebVitalsTracker::new();
        tracker.observe(&PerformanceEntry::LargestContentfulPaint { start_time: 800.0 });
        let latest =
            tracker.observe(&PerformanceEntry::LargestContentfulPaint { start_time: 1200.0 });

        assert_eq!(
            latest,
            Some(VitalReport {
                metric: LCP,
                value: 1200.0
            })
        );
        assert_eq!(tracker.largest_contentful_paint(), Some(1200.0));
    }

    #[test]
    fn test_first_contentful_paint_reported_once() {
        let mut tracker = WebVitalsTracker::new();
        let paint = |name: &str, start_time| PerformanceEntry::Paint {
            name: name.to_string(),
            start_time,
        };

        assert_eq!(tracker.observe(&paint("first-paint", 100.0)), None);
        assert_eq!(
            tracker.observe(&paint(FIRST_CONTENTFUL_PAINT, 150.0)),
            Some(VitalReport {
                metric: FCP,
                value: 150.0
            })
        );
        assert_eq!(tracker.observe(&paint(FIRST_CONTENTFUL_PAINT, 300.0)), None);
    }

    #[test]
    fn test_first_input_delay_and_ttfb() {
        let mut tracker = WebVitalsTracker::new();

        let fid = tracker.observe(&PerformanceEntry::FirstInput {
            start_time: 1000.0,
            processing_start: 1016.0,
        });
        let second = tracker.observe(&PerformanceEntry::FirstInput {
            start_time: 2000.0,
            processing_start: 2100.0,
        });
        let ttfb = tracker.observe(&PerformanceEntry::Navigation {
            request_start: 20.0,
            response_start: 120.0,
        });

        assert_eq!(fid.map(|r| r.value), Some(16.0));
        assert_eq!(second, None);
        assert_eq!(
            ttfb,
            Some(VitalReport {
                metric: TTFB,
                value: 100.0
            })
        );
    }

    #[test]
    fn test_interaction_reports_only_slower_ones() {
        let mut tracker = WebVitalsTracker::new();
        let interaction = |interaction_id, duration| PerformanceEntry::Interaction {
            interaction_id,
            duration,
        };

        assert!(tracker.observe(&interaction(1, 80.0)).is_some());
        assert_eq!(tracker.observe(&interaction(2, 40.0)), None);
        assert_eq!(
            tracker.observe(&interaction(3, 240.0)).map(|r| r.value),
            Some(240.0)
        );
    }

    #[test]
    fn test_reset_starts_new_page_view() {
        let mut tracker = WebVitalsTracker::new();
        tracker.observe(&shift(0.2, false));
        tracker.observe(&PerformanceEntry::FirstInput {
            start_time: 0.0,
            processing_start: 5.0,
        });

        tracker.reset();

        assert_eq!(tracker.cumulative_layout_shift(), 0.0);
        assert!(tracker
            .observe(&PerformanceEntry::FirstInput {
                start_time: 0.0,
                processing_start: 9.0,
            })
            .is_some());
    }
}
