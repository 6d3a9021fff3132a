use chronicle_domain::domain_event::DomainEvent;
use chronicle_macros::domain_event;

#[domain_event(version = 2)]
enum ShipmentEvent {
    #[event(event_type = "shipment.dispatched")]
    Dispatched { carrier: String },
    Delayed(u32),
    #[event(event_version = 3)]
    Delivered,
}

fn main() {
    let dispatched = ShipmentEvent::Dispatched { carrier: "dhl".into() };
    assert_eq!(dispatched.event_type(), "shipment.dispatched");
    assert_eq!(dispatched.event_version(), 2);

    assert_eq!(ShipmentEvent::Delayed(3).event_type(), "ShipmentEvent.Delayed");
    assert_eq!(ShipmentEvent::Delivered.event_version(), 3);
}
