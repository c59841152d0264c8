/// In-page UI: the injected button and transient notices
pub mod affordance;
pub mod notify;
