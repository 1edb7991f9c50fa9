//! Recording power rail.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use adsp_power::{PowerController, PowerError, PowerResult};

#[derive(Debug, Default)]
pub struct MockPowerController {
    powered: AtomicBool,
    on_count: AtomicU32,
    off_count: AtomicU32,
    fail_on: AtomicBool,
    fail_off: AtomicBool,
}

impl MockPowerController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_count(&self) -> u32 {
        self.on_count.load(Ordering::SeqCst)
    }

    pub fn off_count(&self) -> u32 {
        self.off_count.load(Ordering::SeqCst)
    }

    pub fn fail_power_on(&self, fail: bool) {
        self.fail_on.store(fail, Ordering::SeqCst);
    }

    pub fn fail_power_off(&self, fail: bool) {
        self.fail_off.store(fail, Ordering::SeqCst);
    }
}

impl PowerController for MockPowerController {
    fn power_on(&self) -> PowerResult<()> {
        if self.fail_on.load(Ordering::SeqCst) {
            return Err(PowerError::PowerOnFailed("rail fault".into()));
        }
        self.on_count.fetch_add(1, Ordering::SeqCst);
        self.powered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn power_off(&self) -> PowerResult<()> {
        if self.fail_off.load(Ordering::SeqCst) {
            return Err(PowerError::PowerOffFailed("rail fault".into()));
        }
        self.off_count.fetch_add(1, Ordering::SeqCst);
        self.powered.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }
}
