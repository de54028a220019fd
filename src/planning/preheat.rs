//! Preheat scheduling (spec §4.8): warm-up and cool-down point computation
//! for extruder switches, and placement of the resulting
//! `temperature_inserts`. Grounded on CuraEngine's `Preheat.cpp` (read
//! before the example pack was lost): a linear heat-up/cool-down rate model,
//! with the during-printing cool-down rate reduced by the material's own
//! extrusion cool-down speed.
//!
//! The path container here only offers `path_index` granularity for
//! inserts (spec §3's `TemperatureInsert`), not a continuous time offset
//! within a path, so "point within the window" is resolved to the latest
//! path boundary by which heating/cooling must have started to finish on
//! time, walking backward over estimated per-path durations.

use crate::path::extruder_plan::{ExtruderPlan, TemperatureInsert};
use crate::path::motion::{MotionKind, MotionRecord};
use crate::settings::TemperatureSettings;

const MICROMETRES_PER_MM: f64 = 1000.0;

/// Time needed to heat from `idle_temperature` to `target_temperature` at
/// `heat_up_speed` (degC/s); zero if already at or above target.
pub fn time_to_heat_up(idle_temperature: f64, target_temperature: f64, heat_up_speed: f64) -> f64 {
    if target_temperature <= idle_temperature || heat_up_speed <= 0.0 {
        return 0.0;
    }
    (target_temperature - idle_temperature) / heat_up_speed
}

/// Time needed to cool from `from_temperature` to `standby_temperature`.
/// When `during_printing` is set, `material_extrusion_cool_down_speed` is
/// subtracted from `idle_cool_down_speed` (printing slows cooling relative
/// to sitting idle).
pub fn time_to_cool_down(
    from_temperature: f64,
    standby_temperature: f64,
    idle_cool_down_speed: f64,
    material_extrusion_cool_down_speed: f64,
    during_printing: bool,
) -> f64 {
    if standby_temperature >= from_temperature {
        return 0.0;
    }
    let rate = if during_printing {
        (idle_cool_down_speed - material_extrusion_cool_down_speed).max(0.001)
    } else {
        idle_cool_down_speed
    };
    (from_temperature - standby_temperature) / rate
}

fn path_duration(path: &MotionRecord) -> f64 {
    let speed = path.nominal_speed.value() * path.speed_factor * path.back_pressure_factor;
    if speed <= 0.0 {
        return 0.0;
    }
    path.points.windows(2).map(|w| w[0].distance(w[1]) / MICROMETRES_PER_MM / speed).sum()
}

fn first_extrusion_index(plan: &ExtruderPlan) -> Option<usize> {
    plan.paths.iter().position(|p| p.kind == MotionKind::Extrusion)
}

/// The latest path index at or before `before_index` from which the
/// cumulative duration of paths `[index, before_index)` is at least
/// `required_duration`.
fn index_with_lead_time(plan: &ExtruderPlan, before_index: usize, required_duration: f64) -> usize {
    let mut remaining = required_duration;
    let mut index = before_index;
    while index > 0 && remaining > 0.0 {
        remaining -= path_duration(&plan.paths[index - 1]);
        index -= 1;
    }
    index
}

/// Schedules the temperature inserts for a switch from `outgoing` to
/// `incoming` (spec §4.8): the incoming plan reaches
/// `required_start_temperature` exactly at its first extrusion, and the
/// outgoing plan is told to cool to `previous_extruder_standby_temperature`
/// as soon as its own last path is done.
pub fn schedule_extruder_switch(
    outgoing: &mut ExtruderPlan,
    incoming: &mut ExtruderPlan,
    temperature: &TemperatureSettings,
    outgoing_temperature: f64,
    required_start_temperature: f64,
    previous_extruder_standby_temperature: f64,
) {
    outgoing.previous_extruder_standby_temperature = Some(previous_extruder_standby_temperature);
    outgoing.insert_temperature(TemperatureInsert {
        path_index: outgoing.paths.len(),
        temperature: previous_extruder_standby_temperature,
        wait: false,
    });

    incoming.required_start_temperature = Some(required_start_temperature);
    let heat_up_time = time_to_heat_up(outgoing_temperature, required_start_temperature, temperature.nozzle_heat_up_speed);
    let first_extrusion = first_extrusion_index(incoming).unwrap_or(0);
    let warmup_index = index_with_lead_time(incoming, first_extrusion, heat_up_time);
    incoming.insert_temperature(TemperatureInsert {
        path_index: warmup_index,
        temperature: required_start_temperature,
        wait: true,
    });
}
