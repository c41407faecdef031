// Global key monitor
// Watches for Escape outside the overlay and forwards presses into the event loop.
// Keyboard devices are read directly when possible; otherwise Escape is
// grabbed on the X11 root window, which only sees keys while an X11 client
// has focus.

use anyhow::{bail, Context, Result};
use evdev::{Device, InputEvent, InputEventKind};
use global_hotkey::hotkey::{Code, HotKey};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use log::{debug, info, warn};
use smithay_client_toolkit::reexports::calloop::channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// A key observed by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Other(u32),
}

/// What the event loop does with a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Terminate,
    Ignore,
}

pub fn classify(key: Key) -> KeyAction {
    match key {
        Key::Escape => KeyAction::Terminate,
        Key::Other(_) => KeyAction::Ignore,
    }
}

/// Keeps the observer alive; dropping it stops watching
pub struct KeyMonitor {
    backend: Backend,
}

enum Backend {
    Devices(DeviceReader),
    X11(X11Grab),
}

impl Backend {
    fn describe(&self) -> String {
        match self {
            Backend::Devices(reader) => format!("{} keyboard device(s)", reader.devices),
            Backend::X11(grab) => format!("X11 grab of hotkey {}", grab.escape.id()),
        }
    }
}

impl KeyMonitor {
    /// Start observing and send every key-down to `sender`.
    ///
    /// Both backends report from their own threads, so they only forward;
    /// handling happens wherever `sender`'s channel is dispatched.
    pub fn install(sender: Sender<Key>) -> Result<Self> {
        let backend = match DeviceReader::install(sender.clone()) {
            Ok(reader) => Backend::Devices(reader),
            Err(e) => {
                debug!("Keyboard devices not readable: {:#}", e);
                warn!(
                    "Watching Escape through an X11 grab: it is only seen while an X11 \
                     client has focus, not while a native Wayland window does"
                );
                Backend::X11(X11Grab::install(sender)?)
            }
        };

        info!(
            "Global key monitor installed via {} (Escape to exit)",
            backend.describe()
        );
        Ok(Self { backend })
    }
}

impl Drop for KeyMonitor {
    fn drop(&mut self) {
        debug!("Stopping key monitor ({})", self.backend.describe());
    }
}

/// Reads every keyboard under /dev/input on its own thread, focus-independent
struct DeviceReader {
    stop: Arc<AtomicBool>,
    devices: usize,
}

impl DeviceReader {
    fn install(sender: Sender<Key>) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let mut devices = 0;

        // enumerate() only yields devices this process could open
        for (path, device) in evdev::enumerate() {
            if !has_escape(&device) {
                continue;
            }
            debug!(
                "Watching {} ({})",
                path.display(),
                device.name().unwrap_or("unnamed")
            );
            spawn_reader(device, sender.clone(), Arc::clone(&stop))
                .with_context(|| format!("Failed to start reader for {}", path.display()))?;
            devices += 1;
        }

        if devices == 0 {
            stop.store(true, Ordering::Relaxed);
            bail!("No readable keyboard with an Escape key under /dev/input");
        }
        Ok(Self { stop, devices })
    }
}

impl Drop for DeviceReader {
    fn drop(&mut self) {
        // Readers notice on their next event; they never touch loop state
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn has_escape(device: &Device) -> bool {
    device
        .supported_keys()
        .map_or(false, |keys| keys.contains(evdev::Key::KEY_ESC))
}

fn spawn_reader(mut device: Device, sender: Sender<Key>, stop: Arc<AtomicBool>) -> Result<()> {
    thread::Builder::new()
        .name("pinlay-keys".to_string())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let events = match device.fetch_events() {
                    Ok(events) => events,
                    Err(e) => {
                        warn!("Keyboard device read failed: {}", e);
                        return;
                    }
                };
                for event in events {
                    let Some(key) = key_press(&event) else {
                        continue;
                    };
                    if sender.send(key).is_err() {
                        debug!("Event loop gone, dropping key {:?}", key);
                        return;
                    }
                }
            }
        })?;
    Ok(())
}

/// Key-down events only; releases (0) and auto-repeats (2) are skipped
fn key_press(event: &InputEvent) -> Option<Key> {
    const PRESSED: i32 = 1;
    match event.kind() {
        InputEventKind::Key(key) if event.value() == PRESSED => Some(if key == evdev::Key::KEY_ESC {
            Key::Escape
        } else {
            Key::Other(u32::from(key.code()))
        }),
        _ => None,
    }
}

/// Escape grabbed on the X11 root window through `global-hotkey`
struct X11Grab {
    manager: GlobalHotKeyManager,
    escape: HotKey,
}

impl X11Grab {
    fn install(sender: Sender<Key>) -> Result<Self> {
        // global-hotkey reports success even when its own X connection fails
        x11rb::connect(None).context("No X server reachable for the Escape grab")?;

        let manager =
            GlobalHotKeyManager::new().context("Failed to start the global key monitor")?;

        let escape = HotKey::new(None, Code::Escape);
        manager
            .register(escape)
            .context("Failed to grab the Escape key")?;

        let escape_id = escape.id();
        let sender = Mutex::new(sender);
        GlobalHotKeyEvent::set_event_handler(Some(move |event: GlobalHotKeyEvent| {
            if event.state() != HotKeyState::Pressed {
                return;
            }
            let key = key_for_id(event.id(), escape_id);
            let Ok(sender) = sender.lock() else {
                return;
            };
            if sender.send(key).is_err() {
                debug!("Event loop gone, dropping key {:?}", key);
            }
        }));

        Ok(Self { manager, escape })
    }
}

impl Drop for X11Grab {
    fn drop(&mut self) {
        GlobalHotKeyEvent::set_event_handler(None::<fn(GlobalHotKeyEvent)>);
        if let Err(e) = self.manager.unregister(self.escape) {
            warn!("Failed to release the Escape grab: {}", e);
        }
    }
}

fn key_for_id(id: u32, escape_id: u32) -> Key {
    if id == escape_id {
        Key::Escape
    } else {
        Key::Other(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{assert, let_assert};
    use evdev::EventType;
    use smithay_client_toolkit::reexports::calloop::channel;

    #[test]
    fn escape_terminates() {
        assert!(classify(Key::Escape) == KeyAction::Terminate);
    }

    #[test]
    fn other_keys_are_ignored() {
        for id in [0, 1, 42, u32::MAX] {
            assert!(classify(Key::Other(id)) == KeyAction::Ignore);
        }
    }

    #[test]
    fn hotkey_ids_resolve_to_keys() {
        let escape_id = HotKey::new(None, Code::Escape).id();
        let other_id = HotKey::new(None, Code::KeyQ).id();
        assert!(key_for_id(escape_id, escape_id) == Key::Escape);
        assert!(key_for_id(other_id, escape_id) == Key::Other(other_id));
    }

    #[test]
    fn escape_press_from_a_device_is_escape() {
        let event = InputEvent::new(EventType::KEY, evdev::Key::KEY_ESC.code(), 1);
        assert!(key_press(&event) == Some(Key::Escape));
    }

    #[test]
    fn other_device_presses_carry_their_code() {
        let code = evdev::Key::KEY_Q.code();
        let event = InputEvent::new(EventType::KEY, code, 1);
        assert!(key_press(&event) == Some(Key::Other(u32::from(code))));
    }

    #[test]
    fn releases_repeats_and_non_key_events_are_skipped() {
        let esc = evdev::Key::KEY_ESC.code();
        assert!(key_press(&InputEvent::new(EventType::KEY, esc, 0)).is_none());
        assert!(key_press(&InputEvent::new(EventType::KEY, esc, 2)).is_none());
        assert!(key_press(&InputEvent::new(EventType::SYNCHRONIZATION, 0, 0)).is_none());
    }

    #[test]
    fn x11_grab_fails_without_display() {
        // The only test that touches DISPLAY
        std::env::remove_var("DISPLAY");
        let (sender, _channel) = channel::channel::<Key>();
        let result = X11Grab::install(sender).map(|_| ());
        let_assert!(Err(e) = result);
        assert!(format!("{:#}", e).contains("No X server reachable"));
    }
}
