use serde::{Deserialize, Serialize};

/// Physical constants of the pendulum and the bounds used to normalize
/// states and actions into `[-1, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendulumParams {
    /// Pendulum mass in kg
    pub mass: f32,
    /// Pendulum length in meters
    pub length: f32,
    /// Viscous friction coefficient
    pub friction: f32,
    /// Gravitational acceleration in m/s^2
    pub gravity: f32,
    /// Sampling interval in seconds
    pub dt: f32,
    /// Explicit Euler substeps per sampling interval
    pub substeps: usize,
    /// Angle that maps to a normalized state of 1 (radians)
    pub max_angle: f32,
    /// Angular velocity that maps to a normalized state of 1 (rad/s)
    pub max_angular_velocity: f32,
    /// Torque that maps to a normalized action of 1 (N m)
    pub max_torque: f32,
}

impl Default for PendulumParams {
    fn default() -> Self {
        let (mass, length, gravity) = (0.15, 0.5, 9.81);
        Self {
            mass,
            length,
            friction: 0.0,
            gravity,
            dt: 0.01,
            substeps: 10,
            max_angle: 30f32.to_radians(),
            max_angular_velocity: (gravity / length).sqrt(),
            max_torque: mass * gravity * length,
        }
    }
}

impl PendulumParams {
    pub fn inertia(&self) -> f32 {
        self.mass * self.length * self.length
    }
}
