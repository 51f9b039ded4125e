/*!

A "logger" used when the `logging` feature is off. It outputs nothing but satisfies the public
API, so parameter files with a `logging` section still load.

*/

use crate::log::LogConfiguration;

impl LogConfiguration {
    /// Sets the global logger to conform to this `LogConfiguration`.
    pub(in crate::log) fn set_config(&mut self) {
        log::set_max_level(self.global_log_level);
    }
}
