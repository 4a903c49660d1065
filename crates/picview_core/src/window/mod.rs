//! Main window core: state, job lifecycle, reconciliation and commands.

mod commands;
mod controller;
mod errors;
mod events;
mod gallery;
mod plugins;
mod reconcile;
mod state;
mod toolkit;
mod trash;

pub use controller::{CloseOutcome, CloseResponse, Resolution, WindowController};
pub use errors::{WindowError, WindowResult};
pub use events::{Command, WindowEvent};
pub use gallery::Gallery;
pub use plugins::{PluginRegistry, WindowActivatable, WindowHandle};
pub use reconcile::{
    format_size, image_info, reconcile, status_text, Action, ActionGroup, Policy, StartupFlags,
    UiSnapshot, APP_NAME,
};
pub use state::{
    ActiveJob, Banner, BannerKind, BannerResponse, Displayed, JobSlots, Remedy, StatusContext,
    StatusStack, WindowMode, WindowState, WindowStatus,
};
pub use toolkit::{LogToolkit, Toolkit};
pub use trash::{remove_image_file, TrashMode, TrashReport};
