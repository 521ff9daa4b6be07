use std::collections::BTreeMap;

use crate::CONTROLLER_NAME;

/// Label holding the role of a benchmark workload.
pub const ROLE_LABEL: &str = "netbench.dev/role";

/// Manage by label
pub const MANAGED_BY_LABEL_SELECTOR: &str = "managed-by=netbench";

/// Labels that indicate the resource is managed by the netbench operator.
pub fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from_iter(vec![(
        "managed-by".to_owned(),
        CONTROLLER_NAME.to_owned(),
    )])
}

/// Managed labels extended with the app and role of a benchmark workload.
pub fn workload_labels(role: &str) -> BTreeMap<String, String> {
    let mut labels = managed_labels();
    labels.insert("app".to_owned(), CONTROLLER_NAME.to_owned());
    labels.insert(ROLE_LABEL.to_owned(), role.to_owned());
    labels
}
