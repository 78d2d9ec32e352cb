mod height_view;
mod monitor_view;
mod move_view;
mod painter;
mod scan_view;
mod spinner;
mod table;

pub(crate) use self::height_view::HeightView;
pub(crate) use self::monitor_view::{MonitorReadyView, MonitorSampleView, MonitorSummaryView};
pub(crate) use self::move_view::MoveOutcomeView;
pub(crate) use self::painter::Painter;
pub(crate) use self::scan_view::{SavedDeskView, ScanResultsView};
pub(crate) use self::spinner::Spinner;
