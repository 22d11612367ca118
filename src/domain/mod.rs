// Domain layer: transient document models and the ports (interfaces) to outbound services.

pub mod model;
pub mod ports;
