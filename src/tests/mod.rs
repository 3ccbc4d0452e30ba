//! Scenario tests spanning the rate limiter, circuit breaker and retry handler.
