mod coalesce;
mod flow_control;
mod resilience;
