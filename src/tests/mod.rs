mod fakes;
mod gateway_tests;
mod monitor_tests;
mod planner_tests;
mod validator_tests;
