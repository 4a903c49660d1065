//! Window plugins.
//!
//! Plugins are passed to the window at construction. They are activated
//! once the window exists and deactivated on teardown; plugins added
//! later are activated immediately.

use tokio::sync::mpsc::UnboundedSender;

use super::events::{Command, WindowEvent};
use super::reconcile::UiSnapshot;

/// Capability a plugin exposes to a window.
pub trait WindowActivatable: Send {
    fn name(&self) -> &str;

    fn activate(&mut self, window: &WindowHandle);

    fn deactivate(&mut self, window: &WindowHandle);

    /// Called after the window's UI state changed.
    fn update_state(&mut self, _window: &WindowHandle, _snapshot: &UiSnapshot) {}
}

/// Cheap handle plugins use to talk to their window.
#[derive(Debug, Clone)]
pub struct WindowHandle {
    events: UnboundedSender<WindowEvent>,
}

impl WindowHandle {
    pub(crate) fn new(events: UnboundedSender<WindowEvent>) -> Self {
        Self { events }
    }

    /// Queue a command for the window loop. Returns false once the
    /// window is gone.
    pub fn post(&self, command: Command) -> bool {
        self.events.send(WindowEvent::Command(command)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Plugins attached to one window.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn WindowActivatable>>,
    active: bool,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, plugin: Box<dyn WindowActivatable>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn activate_all(&mut self, window: &WindowHandle) {
        if self.active {
            return;
        }
        for plugin in &mut self.plugins {
            tracing::debug!("Activating plugin {}", plugin.name());
            plugin.activate(window);
        }
        self.active = true;
    }

    pub fn deactivate_all(&mut self, window: &WindowHandle) {
        if !self.active {
            return;
        }
        for plugin in self.plugins.iter_mut().rev() {
            tracing::debug!("Deactivating plugin {}", plugin.name());
            plugin.deactivate(window);
        }
        self.active = false;
    }

    /// Attach a plugin, activating it if the registry is active.
    pub fn add(&mut self, mut plugin: Box<dyn WindowActivatable>, window: &WindowHandle) {
        if self.active {
            plugin.activate(window);
        }
        self.plugins.push(plugin);
    }

    /// Detach a plugin by name, deactivating it first. Returns false if
    /// no plugin has that name.
    pub fn remove(&mut self, name: &str, window: &WindowHandle) -> bool {
        let Some(index) = self.plugins.iter().position(|p| p.name() == name) else {
            return false;
        };
        let mut plugin = self.plugins.remove(index);
        if self.active {
            plugin.deactivate(window);
        }
        true
    }

    pub fn update_state(&mut self, window: &WindowHandle, snapshot: &UiSnapshot) {
        for plugin in &mut self.plugins {
            plugin.update_state(window, snapshot);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Plugin that logs lifecycle calls and can post a command on activation.
    pub struct RecordingPlugin {
        pub name: String,
        pub calls: Arc<Mutex<Vec<String>>>,
        pub on_activate: Option<Command>,
    }

    impl RecordingPlugin {
        pub fn new(name: &str, calls: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                name: name.to_string(),
                calls: Arc::clone(calls),
                on_activate: None,
            })
        }
    }

    impl WindowActivatable for RecordingPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn activate(&mut self, window: &WindowHandle) {
            self.calls.lock().push(format!("activate {}", self.name));
            if let Some(command) = self.on_activate {
                window.post(command);
            }
        }

        fn deactivate(&mut self, _window: &WindowHandle) {
            self.calls.lock().push(format!("deactivate {}", self.name));
        }
    }
}
