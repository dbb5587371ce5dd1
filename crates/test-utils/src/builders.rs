use chrono::Utc;

use healtrack::events::{PushEvent, TestStep};
use healtrack::executions::ExecutionRequest;
use healtrack::healing::{HealingEvent, HealingStatus};
use healtrack::ids::ExecutionId;
use healtrack::types::{Browser, LogSeverity, RunMode, StepStatus};

/// Builder for `ExecutionRequest`.
pub struct RequestBuilder {
    request: ExecutionRequest,
}

impl RequestBuilder {
    pub fn new(test_id: &str) -> Self {
        Self {
            request: ExecutionRequest {
                product: "shop".to_string(),
                test_class: "CheckoutTests".to_string(),
                test_id: test_id.to_string(),
                mode: RunMode::Headless,
                browser: Browser::Chromium,
            },
        }
    }

    pub fn product(mut self, product: &str) -> Self {
        self.request.product = product.to_string();
        self
    }

    pub fn test_class(mut self, test_class: &str) -> Self {
        self.request.test_class = test_class.to_string();
        self
    }

    pub fn headed(mut self) -> Self {
        self.request.mode = RunMode::Headed;
        self
    }

    pub fn browser(mut self, browser: Browser) -> Self {
        self.request.browser = browser;
        self
    }

    pub fn build(self) -> ExecutionRequest {
        self.request
    }
}

/// Builder for `HealingEvent`.
pub struct HealingEventBuilder {
    event: HealingEvent,
}

impl HealingEventBuilder {
    pub fn new(locator_key: &str, old_locator: &str, status: HealingStatus) -> Self {
        Self {
            event: HealingEvent {
                locator_key: locator_key.to_string(),
                old_locator: old_locator.to_string(),
                new_locator: None,
                status,
                healing_session_id: None,
                error: None,
                time: Utc::now(),
            },
        }
    }

    pub fn new_locator(mut self, locator: &str) -> Self {
        self.event.new_locator = Some(locator.to_string());
        self
    }

    pub fn session(mut self, session: &str) -> Self {
        self.event.healing_session_id = Some(session.to_string());
        self
    }

    pub fn error(mut self, error: &str) -> Self {
        self.event.error = Some(error.to_string());
        self
    }

    pub fn build(self) -> HealingEvent {
        self.event
    }
}

/// Shorthand for a healing event without session or new locator.
pub fn healing(locator_key: &str, old_locator: &str, status: HealingStatus) -> HealingEvent {
    HealingEventBuilder::new(locator_key, old_locator, status).build()
}

pub fn test_started(execution_id: ExecutionId) -> PushEvent {
    PushEvent::TestStarted {
        execution_id,
        message: "Test started".to_string(),
    }
}

pub fn log_line(message: &str) -> PushEvent {
    PushEvent::Log {
        message: message.to_string(),
        level: LogSeverity::Info,
        timestamp: Utc::now(),
    }
}

pub fn step(step_number: u32, title: &str) -> PushEvent {
    PushEvent::StepCompleted {
        step_number,
        step_title: title.to_string(),
        status: StepStatus::Passed,
        duration: 10,
        timestamp: Utc::now(),
        screenshot_url: None,
    }
}

pub fn finished(success: bool) -> PushEvent {
    PushEvent::TestFinished {
        success,
        exit_code: Some(if success { 0 } else { 1 }),
        report_url: None,
        screenshots: Vec::new(),
        videos: Vec::new(),
        test_steps: vec![TestStep {
            step_number: 1,
            title: "open page".to_string(),
            status: if success {
                StepStatus::Passed
            } else {
                StepStatus::Failed
            },
            duration: 10,
        }],
    }
}

pub fn error(message: &str) -> PushEvent {
    PushEvent::Error {
        message: message.to_string(),
    }
}
