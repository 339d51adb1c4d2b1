pub mod ekf7;
pub mod kalman_rts;
