#![cfg(all(feature = "memory-store", feature = "memory-cache"))]

use futures::executor::block_on;
use proptest::collection::vec;
use proptest::prelude::*;
use rs_rbac::{
    EngineBuilder, MemoryCache, MemoryStore, NewPermission, NewRole, PermissionCode, RoleName,
    Status, UserId,
};
use std::collections::BTreeSet;

const ROLES: usize = 4;
const PERMISSIONS: usize = 6;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn effective_permissions_are_union_of_enabled_roles(
        grants in vec(vec(any::<bool>(), PERMISSIONS), ROLES),
        held in vec(any::<bool>(), ROLES),
        role_enabled in vec(any::<bool>(), ROLES),
        permission_enabled in vec(any::<bool>(), PERMISSIONS),
    ) {
        let store = MemoryStore::new();
        let engine = EngineBuilder::new(store.clone())
            .cache(MemoryCache::new(1_024))
            .build();
        let user = UserId::new(7);

        let codes: Vec<PermissionCode> = (0..PERMISSIONS)
            .map(|i| PermissionCode::from_parts(format!("res{i}"), "read").unwrap())
            .collect();
        let permission_ids: Vec<_> = codes
            .iter()
            .map(|code| {
                block_on(engine.create_permission(NewPermission::new(code.clone(), code.as_str())))
                    .unwrap()
                    .id
            })
            .collect();

        let mut expected = BTreeSet::new();
        for (r, granted) in grants.iter().enumerate() {
            let name = RoleName::new(format!("role{r}")).unwrap();
            let role = block_on(engine.create_role(NewRole::new(name, "generated")))
                .unwrap()
                .id;
            let assigned: Vec<_> = granted
                .iter()
                .zip(&permission_ids)
                .filter(|(on, _)| **on)
                .map(|(_, id)| *id)
                .collect();
            block_on(engine.assign_permissions_to_role(role, &assigned)).unwrap();
            if held[r] {
                block_on(engine.assign_role_to_user(user, role)).unwrap();
            }
            if !role_enabled[r] {
                store.set_role_status(role, Status::Disabled).unwrap();
            }
            if held[r] && role_enabled[r] {
                for (p, on) in granted.iter().enumerate() {
                    if *on && permission_enabled[p] {
                        expected.insert(codes[p].clone());
                    }
                }
            }
        }
        for (p, enabled) in permission_enabled.iter().enumerate() {
            if !enabled {
                store
                    .set_permission_status(permission_ids[p], Status::Disabled)
                    .unwrap();
            }
        }

        let effective = block_on(engine.get_user_permissions(user)).unwrap();
        prop_assert_eq!(effective, expected.iter().cloned().collect::<Vec<_>>());

        for code in &codes {
            let cold = block_on(engine.check_permission(user, code)).unwrap();
            let warm = block_on(engine.check_permission(user, code)).unwrap();
            prop_assert_eq!(cold, expected.contains(code));
            prop_assert_eq!(warm, cold);
        }
    }
}
