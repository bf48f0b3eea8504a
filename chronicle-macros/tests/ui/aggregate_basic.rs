use chronicle_domain::aggregate::{AggregateRoot, AggregateState};
use chronicle_macros::aggregate_root;

#[aggregate_root]
#[derive(PartialEq)]
struct Account {
    owner: String,
    #[serde(default)]
    balance: i64,
}

#[aggregate_root(debug = false)]
struct Silent {
    note: String,
}

impl std::fmt::Debug for Silent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Silent")
    }
}

fn main() {
    let account = Account::default();
    let state: &AggregateState = account.root();
    assert!(state.id().is_none());
    assert_eq!(account.current_sequence_number(), 0);
    assert_eq!(account.clone(), account);
    assert_eq!(format!("{:?}", Silent::default()), "Silent");
}
