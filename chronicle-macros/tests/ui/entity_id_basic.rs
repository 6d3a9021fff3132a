use chronicle_macros::entity_id;

#[entity_id]
struct AccountId(String);

fn main() {
    let id = AccountId::new("acc-1");
    assert_eq!(id.to_string(), "acc-1");
    let parsed: AccountId = "acc-1".parse().unwrap();
    assert_eq!(parsed, id);
    assert_eq!(id.as_ref(), "acc-1");
    assert_eq!(id.into_inner(), "acc-1".to_string());
}
