use parking_lot::Mutex;
use std::sync::Arc;

/// État mutable partagé entre tâches (scheduler, HTTP, health)
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
