use super::{ComponentState, SitefenceApp};
use std::collections::HashMap;
use tracing::debug;

impl SitefenceApp {
    pub(super) fn set_component_state(&self, component: &str, state: ComponentState) {
        let previous = self
            .component_states
            .lock()
            .insert(component.to_string(), state);
        if previous != Some(state) {
            debug!("Component '{}' is now {:?}", component, state);
        }
    }

    pub fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().get(component).copied()
    }

    pub fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.lock().clone()
    }
}
