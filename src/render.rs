//! Projects devices, drafts, health and editing state into a [`TableView`].
//!
//! The view is a plain description of the table; [`crate::tui`] draws it to a
//! terminal and tests inspect it directly. Two strategies produce the same
//! view: a full rebuild every call, or an incremental patch that recomputes
//! only the cells whose inputs changed. Both leave a row's reservation and
//! action cells alone while the row is editing.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::drafts::{DraftStore, InputDraft};
use crate::editing::EditingFlags;
use crate::format::{self, ConsoleTarget, UiLinks, OPEN_ENDED, PLACEHOLDER};
use crate::health::{HealthScheduler, HealthView};
use crate::types::{Device, ReservationTimes, Tag};

pub const CLASS_HEALTH_UP: &str = "health-up";
pub const CLASS_HEALTH_DOWN: &str = "health-down";
pub const CLASS_HEALTH_UNKNOWN: &str = "health-unknown";
pub const CLASS_STATUS_FREE: &str = "status-free";
pub const CLASS_STATUS_RESERVED: &str = "status-resv";
pub const CLASS_STATUS_STATIC: &str = "status-static";

const CELLS_PER_ROW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStrategy {
    #[serde(alias = "full")]
    FullRebuild,
    #[default]
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCell {
    Links(UiLinks),
    Placeholder,
}

/// Text plus the string its copy button puts on the clipboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyCell {
    pub text: String,
    pub copy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCell {
    pub text: String,
    pub class: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCell {
    pub text: String,
    pub class: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationDetails {
    pub owner: String,
    pub duration: String,
    pub remaining: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationCell {
    Details(ReservationDetails),
    /// Free devices show the reservation form seeded from the draft
    Form(InputDraft),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionCell {
    Reserve,
    Release,
    /// Static devices have no action, only the owner
    Owner(String),
    Unavailable,
}

impl ActionCell {
    pub fn label(&self) -> &str {
        match self {
            ActionCell::Reserve => "RESERVE",
            ActionCell::Release => "RELEASE",
            ActionCell::Owner(owner) => owner,
            ActionCell::Unavailable => "-",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowView {
    pub device_id: String,
    pub model: String,
    pub hardware: String,
    pub ui: UiCell,
    pub mgmt: CopyCell,
    pub console: CopyCell,
    pub health: HealthCell,
    pub status: StatusCell,
    pub reservation: ReservationCell,
    pub action: ActionCell,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableView {
    pub rows: Vec<RowView>,
}

impl TableView {
    pub fn row(&self, device_id: &str) -> Option<&RowView> {
        self.rows.iter().find(|r| r.device_id == device_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderStats {
    pub created: usize,
    pub removed: usize,
    pub cells_touched: usize,
    /// Rows whose reservation/action cells were held because they are editing
    pub frozen: usize,
}

impl RenderStats {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.removed == 0 && self.cells_touched == 0
    }
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub strategy: RenderStrategy,
    /// Host used in the UI links
    pub link_host: String,
    /// Terminal server used when a device has no console IP
    pub console_host: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            strategy: RenderStrategy::default(),
            link_host: "localhost".to_string(),
            console_host: "192.168.1.102".to_string(),
        }
    }
}

/// Borrowed client state the renderer reads from.
pub struct RenderContext<'a> {
    pub drafts: &'a DraftStore,
    pub health: &'a HealthScheduler,
    pub editing: &'a EditingFlags,
    pub now: Instant,
}

/// Everything the reservation and action cells are computed from.
#[derive(Debug, Clone, PartialEq)]
struct RegionInputs {
    tag: Tag,
    owner: Option<String>,
    times: ReservationTimes,
    draft: Option<InputDraft>,
}

impl RegionInputs {
    fn of(device: &Device, drafts: &DraftStore) -> Self {
        Self {
            tag: device.tag.clone(),
            owner: device.current_user.clone(),
            times: device.reservation(),
            draft: (device.tag == Tag::Free).then(|| drafts.get_or_default(&device.device_id)),
        }
    }
}

struct CachedRow {
    device: Device,
    health: HealthView,
    region: RegionInputs,
    view: RowView,
}

pub struct Renderer {
    options: RenderOptions,
    rows: HashMap<String, CachedRow>,
    table: TableView,
}

impl Renderer {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            rows: HashMap::new(),
            table: TableView::default(),
        }
    }

    pub fn view(&self) -> &TableView {
        &self.table
    }

    pub fn render(&mut self, devices: &[Device], ctx: &RenderContext<'_>) -> RenderStats {
        let mut stats = RenderStats::default();
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(devices.len());

        for device in devices {
            let id = device.device_id.as_str();
            if !seen.insert(id) {
                continue;
            }
            let health = ctx.health.view(id, ctx.now);
            let region = RegionInputs::of(device, ctx.drafts);
            let editing = ctx.editing.is_editing(id);

            let cached = match self.rows.remove(id) {
                None => {
                    stats.created += 1;
                    stats.cells_touched += CELLS_PER_ROW;
                    CachedRow {
                        view: self.build_row(device, health, &region),
                        device: device.clone(),
                        health,
                        region,
                    }
                }
                Some(cached) => match self.options.strategy {
                    RenderStrategy::FullRebuild => {
                        self.rebuild(cached, device, health, region, editing, &mut stats)
                    }
                    RenderStrategy::Incremental => {
                        self.patch(cached, device, health, region, editing, &mut stats)
                    }
                },
            };
            rows.push(cached.view.clone());
            self.rows.insert(id.to_string(), cached);
        }

        let before = self.rows.len();
        self.rows.retain(|id, _| seen.contains(id.as_str()));
        stats.removed = before - self.rows.len();

        self.table = TableView { rows };
        stats
    }

    fn rebuild(
        &self,
        cached: CachedRow,
        device: &Device,
        health: HealthView,
        region: RegionInputs,
        editing: bool,
        stats: &mut RenderStats,
    ) -> CachedRow {
        let mut view = self.build_row(device, health, &region);
        let region = if editing {
            stats.frozen += 1;
            stats.cells_touched += CELLS_PER_ROW - 2;
            view.reservation = cached.view.reservation;
            view.action = cached.view.action;
            follow_draft(&mut view.reservation, &region);
            cached.region
        } else {
            stats.cells_touched += CELLS_PER_ROW;
            region
        };
        CachedRow {
            device: device.clone(),
            health,
            region,
            view,
        }
    }

    fn patch(
        &self,
        mut cached: CachedRow,
        device: &Device,
        health: HealthView,
        region: RegionInputs,
        editing: bool,
        stats: &mut RenderStats,
    ) -> CachedRow {
        let prev = &cached.device;
        let view = &mut cached.view;
        let mut touched = 0;

        if prev.model_name != device.model_name {
            view.model = text_or_blank(&device.model_name);
            touched += 1;
        }
        if prev.hw_id != device.hw_id {
            view.hardware = text_or_blank(&device.hw_id);
            touched += 1;
        }
        if prev.mgmt_ip != device.mgmt_ip {
            view.ui = self.ui_cell(device);
            view.mgmt = mgmt_cell(device);
            touched += 2;
        }
        if prev.console_ip != device.console_ip || prev.port_id != device.port_id {
            view.console = self.console_cell(device);
            touched += 1;
        }
        if cached.health != health {
            view.health = health_cell(health);
            touched += 1;
        }
        if prev.tag != device.tag {
            view.status = status_cell(&device.tag);
            touched += 1;
        }
        if editing {
            stats.frozen += 1;
            if follow_draft(&mut view.reservation, &region) {
                touched += 1;
            }
        } else if cached.region != region {
            view.reservation = reservation_cell(device, &region);
            view.action = action_cell(device);
            cached.region = region;
            touched += 2;
        }

        stats.cells_touched += touched;
        cached.device = device.clone();
        cached.health = health;
        cached
    }

    fn build_row(&self, device: &Device, health: HealthView, region: &RegionInputs) -> RowView {
        RowView {
            device_id: device.device_id.clone(),
            model: text_or_blank(&device.model_name),
            hardware: text_or_blank(&device.hw_id),
            ui: self.ui_cell(device),
            mgmt: mgmt_cell(device),
            console: self.console_cell(device),
            health: health_cell(health),
            status: status_cell(&device.tag),
            reservation: reservation_cell(device, region),
            action: action_cell(device),
        }
    }

    fn ui_cell(&self, device: &Device) -> UiCell {
        match format::ui_links(device.mgmt_ip.as_deref(), &self.options.link_host) {
            Some(links) => UiCell::Links(links),
            None => UiCell::Placeholder,
        }
    }

    fn console_cell(&self, device: &Device) -> CopyCell {
        console_cell_for(format::console_target(
            device.console_ip.as_deref(),
            device.port_id.as_deref(),
            &self.options.console_host,
        ))
    }
}

/// A frozen form still shows what the user types into it. Returns whether
/// the cell changed.
fn follow_draft(cell: &mut ReservationCell, region: &RegionInputs) -> bool {
    match (cell, &region.draft) {
        (ReservationCell::Form(shown), Some(draft)) if *shown != *draft => {
            *shown = draft.clone();
            true
        }
        _ => false,
    }
}

fn text_or_blank(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn mgmt_cell(device: &Device) -> CopyCell {
    let ip = device
        .mgmt_ip
        .as_deref()
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    CopyCell {
        text: ip.unwrap_or("-").to_string(),
        copy: format::ssh_command(ip),
    }
}

fn console_cell_for(target: Option<ConsoleTarget>) -> CopyCell {
    match target {
        Some(target) => CopyCell {
            text: format!("{}:{}", target.host, target.port),
            copy: Some(target.telnet_command()),
        },
        None => CopyCell {
            text: "-".to_string(),
            copy: None,
        },
    }
}

pub fn health_cell(view: HealthView) -> HealthCell {
    match view {
        HealthView::Up => HealthCell {
            text: "up".to_string(),
            class: CLASS_HEALTH_UP,
        },
        HealthView::Down { failures } if failures > 0 => HealthCell {
            text: format!("down ({})", failures),
            class: CLASS_HEALTH_DOWN,
        },
        HealthView::Down { .. } => HealthCell {
            text: "down".to_string(),
            class: CLASS_HEALTH_DOWN,
        },
        HealthView::Checking => HealthCell {
            text: "checking...".to_string(),
            class: CLASS_HEALTH_UNKNOWN,
        },
        HealthView::Unknown => HealthCell {
            text: "unknown".to_string(),
            class: CLASS_HEALTH_UNKNOWN,
        },
    }
}

pub fn status_cell(tag: &Tag) -> StatusCell {
    let (text, class) = match tag {
        Tag::Free => ("Free", CLASS_STATUS_FREE),
        Tag::Reserved => ("Reserved", CLASS_STATUS_RESERVED),
        Tag::Static => ("Static", CLASS_STATUS_STATIC),
        Tag::Other(raw) => (raw.as_str(), CLASS_STATUS_STATIC),
    };
    StatusCell {
        text: text.to_string(),
        class,
    }
}

fn reservation_cell(device: &Device, region: &RegionInputs) -> ReservationCell {
    match device.tag {
        Tag::Free => ReservationCell::Form(region.draft.clone().unwrap_or_default()),
        Tag::Reserved | Tag::Static => {
            let times = &region.times;
            let owner = device
                .current_user
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .unwrap_or(PLACEHOLDER);
            let remaining = if times.open_ended {
                OPEN_ENDED.to_string()
            } else {
                format::opt_hhmm(times.remaining_seconds)
            };
            ReservationCell::Details(ReservationDetails {
                owner: owner.to_string(),
                duration: format::opt_hhmm(times.duration_seconds),
                remaining,
                start: format::format_timestamp(times.start.as_deref()),
                end: format::format_timestamp(times.end.as_deref()),
            })
        }
        Tag::Other(_) => ReservationCell::Empty,
    }
}

fn action_cell(device: &Device) -> ActionCell {
    match device.tag {
        Tag::Free => ActionCell::Reserve,
        Tag::Reserved => ActionCell::Release,
        Tag::Static => ActionCell::Owner(
            device
                .current_user
                .clone()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| "-".to_string()),
        ),
        Tag::Other(_) => ActionCell::Unavailable,
    }
}
