//! The central object of a simulation.
//!
//! `Context` keeps the simulation clock, a queue of plans (callbacks scheduled at a time and a
//! [`StepPhase`]) and a set of typed data containers called *data plugins*. Modules store their
//! state in plugins and expose behavior through `Context*Ext` extension traits, so the engine is
//! assembled from independent pieces that share only the `Context`.
//!
//! A callback returns `Result<(), EpiError>`; the first error stops [`Context::execute`] and is
//! returned to the caller.
use std::any::{Any, TypeId};

use log::trace;

use crate::error::EpiError;
use crate::plan::{PlanId, Queue, StepPhase};
use crate::{HashMap, HashMapExt};

/// A trait for objects that can provide data containers to be held by `Context`
pub trait DataPlugin: Any {
    type DataContainer: Any;

    fn create_data_container() -> Self::DataContainer;
}

/// Defines a new type for storing data in `Context`.
#[macro_export]
macro_rules! define_data_plugin {
    ($plugin:ident, $data_container:ty, $default: expr) => {
        #[derive(Copy, Clone)]
        struct $plugin;

        impl $crate::context::DataPlugin for $plugin {
            type DataContainer = $data_container;

            fn create_data_container() -> Self::DataContainer {
                $default
            }
        }
    };
}
pub use define_data_plugin;

type Callback = dyn FnOnce(&mut Context) -> Result<(), EpiError>;

pub struct Context {
    plan_queue: Queue<Box<Callback>>,
    data_plugins: HashMap<TypeId, Box<dyn Any>>,
    current_time: f64,
    shutdown_requested: bool,
}

impl Context {
    #[must_use]
    pub fn new() -> Context {
        Context {
            plan_queue: Queue::new(),
            data_plugins: HashMap::new(),
            current_time: 0.0,
            shutdown_requested: false,
        }
    }

    /// Schedules `callback` to run at `time` within `phase`.
    ///
    /// # Panics
    ///
    /// Panics if `time` is `NaN`, infinite or earlier than the current time.
    pub fn add_plan_with_phase(
        &mut self,
        time: f64,
        phase: StepPhase,
        callback: impl FnOnce(&mut Context) -> Result<(), EpiError> + 'static,
    ) -> PlanId {
        assert!(
            !time.is_nan() && !time.is_infinite() && time >= self.current_time,
            "Time is invalid"
        );
        self.plan_queue.add_plan(time, Box::new(callback), phase)
    }

    /// Schedules `callback` to run at `time`, after every step phase planned for that time.
    pub fn add_plan(
        &mut self,
        time: f64,
        callback: impl FnOnce(&mut Context) -> Result<(), EpiError> + 'static,
    ) -> PlanId {
        self.add_plan_with_phase(time, StepPhase::Observation, callback)
    }

    pub fn cancel_plan(&mut self, id: PlanId) -> bool {
        self.plan_queue.cancel_plan(id)
    }

    /// Stops execution after the currently running plan returns. Pending plans are dropped.
    pub fn shutdown(&mut self) {
        trace!("shutdown requested at t={}", self.current_time);
        self.shutdown_requested = true;
    }

    fn add_plugin<T: DataPlugin>(&mut self) {
        self.data_plugins
            .insert(TypeId::of::<T>(), Box::new(T::create_data_container()));
    }

    /// Returns the plugin's data container, creating it with its default on first access.
    pub fn get_data_mut<T: DataPlugin>(&mut self, _plugin: T) -> &mut T::DataContainer {
        let type_id = TypeId::of::<T>();
        if !self.data_plugins.contains_key(&type_id) {
            self.add_plugin::<T>();
        }
        self.data_plugins
            .get_mut(&type_id)
            .and_then(|container| container.downcast_mut::<T::DataContainer>())
            .expect("data plugin container has the wrong type")
    }

    /// Returns the plugin's data container, or `None` if the plugin was never initialized.
    #[must_use]
    pub fn get_data<T: DataPlugin>(&self, _plugin: T) -> Option<&T::DataContainer> {
        self.data_plugins
            .get(&TypeId::of::<T>())
            .and_then(|container| container.downcast_ref::<T::DataContainer>())
    }

    #[must_use]
    pub fn get_current_time(&self) -> f64 {
        self.current_time
    }

    /// Runs plans in order until the queue is empty, `shutdown` is called, or a plan fails.
    pub fn execute(&mut self) -> Result<(), EpiError> {
        trace!("entering event loop");
        while let Some(plan) = self.plan_queue.get_next_plan() {
            self.current_time = plan.time;
            (plan.data)(self)?;
            if self.shutdown_requested {
                self.plan_queue.clear();
                break;
            }
        }
        trace!("event loop finished at t={}", self.current_time);
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
