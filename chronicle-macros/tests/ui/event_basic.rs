use chronicle_domain::domain_event::{DomainEvent, EventPayload, EventType};
use chronicle_domain::error::DomainResult;
use chronicle_macros::domain_event;
use serde::{Deserialize, Serialize};

#[domain_event(origin = "bank", aggregate_type = "account")]
#[derive(Serialize, Deserialize)]
struct Opened {
    owner: String,
}

#[domain_event(origin = "bank", aggregate_type = "account", event_type = "account.renamed", version = 2)]
struct Renamed {
    to: String,
}

#[domain_event(origin = "bank", aggregate_type = "account", hooks = true)]
struct Closed;

impl EventPayload for Closed {
    fn on_create(&self, _event: &DomainEvent) -> DomainResult<()> {
        Ok(())
    }
}

fn main() {
    assert_eq!(Opened::EVENT_TYPE, "Opened");
    assert_eq!(Opened::VERSION, 1);
    assert_eq!(Renamed::EVENT_TYPE, "account.renamed");
    assert_eq!(Renamed::VERSION, 2);
    assert_eq!(Closed::schema().to_string(), "bank.account.Closed@v1");

    let opened = Opened { owner: "ann".into() };
    let _ = opened.clone();
    let _ = Renamed { to: "bob".into() };
}
