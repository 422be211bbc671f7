// Asynchronous hand-off from the pick/resolution write path to derived-data maintenance

// Public API - what other modules can use
pub use bus::EventBus;
pub use dispatcher::EventDispatcher;
pub use events::ScoringEvent;
pub use handler::{EventError, EventHandler};

// Internal modules
mod bus;
mod dispatcher;
mod events;
mod handler;
