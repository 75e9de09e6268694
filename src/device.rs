//! Device selection: one reading stream backed by either the scale or the Progressor

use log::info;

use crate::bluetooth::progressor::ProgressorLink;
use crate::bluetooth::scale::PassiveScale;
use crate::bluetooth::AdapterHandle;
use crate::config::AppConfig;
use crate::models::{DeviceSelection, LinkStatus, WeightReading, WeightSample};

/// What every weight device exposes to the rest of the application
pub trait WeightSource {
    fn current_reading(&self) -> WeightReading;
    fn max_weight(&self) -> f64;
    /// Snapshot of the bounded sample history, oldest first
    fn samples(&self) -> Vec<WeightSample>;
    fn reset(&self);
}

impl WeightSource for PassiveScale {
    fn current_reading(&self) -> WeightReading {
        PassiveScale::current_reading(self)
    }

    fn max_weight(&self) -> f64 {
        PassiveScale::max_weight(self)
    }

    fn samples(&self) -> Vec<WeightSample> {
        PassiveScale::samples(self)
    }

    fn reset(&self) {
        PassiveScale::reset(self)
    }
}

impl WeightSource for ProgressorLink {
    fn current_reading(&self) -> WeightReading {
        ProgressorLink::current_reading(self)
    }

    fn max_weight(&self) -> f64 {
        ProgressorLink::max_weight(self)
    }

    fn samples(&self) -> Vec<WeightSample> {
        ProgressorLink::samples(self)
    }

    fn reset(&self) {
        ProgressorLink::reset(self)
    }
}

/// Holds both devices and routes everything to the selected one
pub struct DeviceSelector {
    selection: DeviceSelection,
    scale: PassiveScale,
    progressor: ProgressorLink,
}

impl DeviceSelector {
    /// Build both devices on a shared adapter; no radio activity starts yet
    pub fn new(adapter: AdapterHandle, config: &AppConfig) -> Self {
        DeviceSelector {
            selection: config.device,
            scale: PassiveScale::new(
                adapter.clone(),
                config.scale_name_filter.clone(),
                config.sample_capacity,
            ),
            progressor: ProgressorLink::new(
                adapter,
                config.progressor_name.clone(),
                config.sample_capacity,
            ),
        }
    }

    /// Start the radio work the selected device needs without user action
    ///
    /// The scale scans continuously; the Progressor waits for `scan_and_connect`.
    pub fn activate(&self) {
        if self.selection == DeviceSelection::PassiveScale {
            self.scale.start();
        }
    }

    /// Switch devices, stopping the old one's radio before the new one starts
    ///
    /// Both sample histories are cleared. Selecting the current device does nothing.
    pub async fn select(&mut self, selection: DeviceSelection) {
        if selection == self.selection {
            return;
        }

        info!("Switching device from {} to {}", self.selection, selection);
        self.deactivate().await;
        self.scale.reset();
        self.progressor.reset();

        self.selection = selection;
        self.activate();
    }

    /// Stop all radio activity of the selected device
    pub async fn deactivate(&self) {
        match self.selection {
            DeviceSelection::PassiveScale => self.scale.stop(),
            DeviceSelection::ActiveSensor => self.progressor.stop_monitoring().await,
        }
    }

    pub fn selection(&self) -> DeviceSelection {
        self.selection
    }

    pub fn source(&self) -> &dyn WeightSource {
        match self.selection {
            DeviceSelection::PassiveScale => &self.scale,
            DeviceSelection::ActiveSensor => &self.progressor,
        }
    }

    pub fn current_reading(&self) -> WeightReading {
        self.source().current_reading()
    }

    pub fn max_weight(&self) -> f64 {
        self.source().max_weight()
    }

    pub fn samples(&self) -> Vec<WeightSample> {
        self.source().samples()
    }

    pub fn reset(&self) {
        self.source().reset()
    }

    /// Connection controls, present only while the Progressor is selected
    pub fn progressor(&self) -> Option<&ProgressorLink> {
        match self.selection {
            DeviceSelection::ActiveSensor => Some(&self.progressor),
            DeviceSelection::PassiveScale => None,
        }
    }

    pub fn link_status(&self) -> Option<LinkStatus> {
        self.progressor().map(ProgressorLink::status)
    }
}
