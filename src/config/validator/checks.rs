use super::{ValidationError, ValidationResult};
use crate::config::types::MbcasConfig;

pub fn check_allocation_bounds(config: &MbcasConfig, result: &mut ValidationResult) {
    if config.absolute_min_allocation_millicores == 0 {
        result.add_error(ValidationError::InvalidValue {
            field: "absolute_min_allocation_millicores",
            reason: "must be positive".to_string(),
        });
    }
    if config.absolute_max_allocation_millicores <= config.absolute_min_allocation_millicores {
        result.add_error(ValidationError::InvalidValue {
            field: "absolute_max_allocation_millicores",
            reason: "must be greater than absolute_min_allocation_millicores".to_string(),
        });
    }
    if !(0.0..100.0).contains(&config.system_reserve_percent) {
        result.add_error(ValidationError::InvalidValue {
            field: "system_reserve_percent",
            reason: "must be in [0, 100)".to_string(),
        });
    }
}

pub fn check_rates(config: &MbcasConfig, result: &mut ValidationResult) {
    for (field, value) in [
        ("alpha_up", config.alpha_up),
        ("alpha_down", config.alpha_down),
        ("sensor_alpha_up", config.sensor_alpha_up),
        ("sensor_alpha_down", config.sensor_alpha_down),
        ("min_change_percent", config.min_change_percent),
        ("throttle_saturation", config.throttle_saturation),
    ] {
        if !(0.0..=1.0).contains(&value) {
            result.add_error(ValidationError::InvalidValue {
                field,
                reason: "must be in [0, 1]".to_string(),
            });
        }
    }
    if config.throttle_saturation <= 0.0 {
        result.add_error(ValidationError::InvalidValue {
            field: "throttle_saturation",
            reason: "must be positive to avoid division by zero".to_string(),
        });
    }
}

pub fn check_step_limits(config: &MbcasConfig, result: &mut ValidationResult) {
    if config.max_step_up <= 1.0 {
        result.add_error(ValidationError::InvalidValue {
            field: "max_step_up",
            reason: "must be greater than 1.0".to_string(),
        });
    }
    if !(0.0..1.0).contains(&config.max_step_down) {
        result.add_error(ValidationError::InvalidValue {
            field: "max_step_down",
            reason: "must be in (0, 1)".to_string(),
        });
    }
    if config.reconcile_concurrency == 0 {
        result.add_error(ValidationError::InvalidValue {
            field: "reconcile_concurrency",
            reason: "must be at least 1".to_string(),
        });
    }
}

pub fn check_q_learning(config: &MbcasConfig, result: &mut ValidationResult) {
    for (field, value) in [
        ("q_learn_rate", config.q_learn_rate),
        ("q_discount", config.q_discount),
        ("epsilon_start", config.epsilon_start),
        ("epsilon_min", config.epsilon_min),
    ] {
        if !(0.0..=1.0).contains(&value) {
            result.add_error(ValidationError::InvalidValue {
                field,
                reason: "must be in [0, 1]".to_string(),
            });
        }
    }
    if config.epsilon_min > config.epsilon_start {
        result.add_error(ValidationError::InvalidValue {
            field: "epsilon_min",
            reason: "must not exceed epsilon_start".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&config.epsilon_decay) {
        result.add_error(ValidationError::InvalidValue {
            field: "epsilon_decay",
            reason: "must be in [0, 1]".to_string(),
        });
    }
    if config.q_max_states == 0 {
        result.add_error(ValidationError::InvalidValue {
            field: "q_max_states",
            reason: "must be at least 1".to_string(),
        });
    }
}

pub fn check_intervals(config: &MbcasConfig, result: &mut ValidationResult) {
    if config.write_interval.is_zero() {
        result.add_error(ValidationError::InvalidValue {
            field: "write_interval",
            reason: "must be positive".to_string(),
        });
    }
    if config.sampling_interval.is_zero() {
        result.add_error(ValidationError::InvalidValue {
            field: "sampling_interval",
            reason: "must be positive".to_string(),
        });
    }
    if config.sampling_interval > config.write_interval {
        result.add_warning(super::ValidationWarning {
            field: "sampling_interval",
            message: "exceeds write_interval; the sensor will only ever see one sample per cycle"
                .to_string(),
        });
    }
}
