use chronicle_domain::aggregate::Aggregate;
use chronicle_domain::entity::{Entity, TenantId};
use chronicle_macros::{domain_event, entity};

#[domain_event]
enum NoteEvent {
    Written { text: String },
}

#[entity(id = String, event = NoteEvent)]
struct Note {
    text: String,
}

impl Aggregate for Note {
    const TYPE: &'static str = "note";

    fn apply(&mut self, event: &Self::Event) {
        match event {
            NoteEvent::Written { text } => self.text = text.clone(),
        }
    }
}

fn main() {
    let mut note = Note::new(TenantId::new("t-1"), "n-1".to_string());
    note.record(NoteEvent::Written { text: "hello".into() });
    assert_eq!(note.text, "hello");
    assert_eq!(note.unsaved_events().len(), 1);
    assert_eq!(note.id(), "n-1");
}
