//! Single source of truth mapping device handle -> controller.

use crate::{Controller, DeviceHandle};
use std::collections::HashMap;

#[derive(Default)]
pub(crate) struct Registry {
    map: HashMap<DeviceHandle, Controller>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// False when the handle is already registered (duplicate-match guard);
    /// the existing entry is left untouched.
    pub fn register(&mut self, controller: Controller) -> bool {
        let handle = controller.handle;
        if self.map.contains_key(&handle) {
            return false;
        }
        self.map.insert(handle, controller);
        true
    }

    /// `None` for a handle that was never (or no longer is) registered;
    /// removal is idempotent.
    pub fn unregister(&mut self, handle: DeviceHandle) -> Option<Controller> {
        self.map.remove(&handle)
    }

    pub fn contains(&self, handle: DeviceHandle) -> bool {
        self.map.contains_key(&handle)
    }

    pub fn get(&self, handle: DeviceHandle) -> Option<&Controller> {
        self.map.get(&handle)
    }

    pub fn get_mut(&mut self, handle: DeviceHandle) -> Option<&mut Controller> {
        self.map.get_mut(&handle)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Controller> {
        self.map.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ControllerKind, DeviceIdentity};

    fn controller(handle: u32) -> Controller {
        Controller::new(
            DeviceHandle(handle),
            ControllerKind::JoyConR,
            DeviceIdentity {
                vendor_id: 0x057E,
                product_id: 0x2007,
                product_name: None,
                serial: None,
            },
        )
    }

    #[test]
    fn duplicate_register_is_rejected() {
        let mut registry = Registry::new();
        assert!(registry.register(controller(1)));
        assert!(!registry.register(controller(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut registry = Registry::new();
        registry.register(controller(1));
        assert!(registry.unregister(DeviceHandle(1)).is_some());
        assert!(registry.unregister(DeviceHandle(1)).is_none());
        assert!(!registry.contains(DeviceHandle(1)));
    }
}
