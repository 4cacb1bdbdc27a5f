pub mod flaky_service;
