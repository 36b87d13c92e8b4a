//! SQL statement templates.
//!
//! Placeholders are never quoted here. Every binding is rendered by the caller
//! with [`Bindings::identifier`](crate::sql::Bindings::identifier) or
//! [`Bindings::literal`](crate::sql::Bindings::literal).

/// Run on the root connection to the maintenance database.
pub const CREATE_DATABASE: &str = "create database {{database}}";

/// Objects owner role, member of the management and root roles.
pub const CREATE_OBJECTS_OWNER: &str =
    "create role {{role_name}} role {{role_group_management}}, {{role_group_root}}";

/// Grant the objects owner everything already in `public`.
pub const GRANT_ALL_TO_OWNER: &str = "grant all privileges on all tables in schema public to {{role_name}}";

/// Rotate a login password.
pub const UPDATE_PASSWORD: &str = "alter user {{user}} with password {{password}}";

/// Management role used for every credential operation on a cluster.
pub const CREATE_MANAGEMENT_ROLE: &str =
    "create role {{user}} with login password {{password}} createrole nocreatedb noinherit";

/// Extend a leased principal.
pub const RENEW_EXPIRY: &str = "alter role {{user}} valid until {{expiration}}";

/// Creation statements used when a role defines none.
pub const DEFAULT_CREATION_SQL: &[&str] = &[
    "create role {{user}} with login password {{password}} inherit in role {{objects_owner}} valid until {{expiration}} role {{group}}",
    "alter default privileges for role {{user}} grant all privileges on tables to {{objects_owner}}",
    "alter default privileges for role {{user}} grant all privileges on sequences to {{objects_owner}}",
];

/// Revocation statements used when a role defines none or no longer exists.
pub const DEFAULT_REVOCATION_SQL: &[&str] = &[
    "set role {{user}}",
    "reassign owned by {{user}} to {{objects_owner}}",
    "drop owned by {{user}}",
    "reset role",
    "revoke {{objects_owner}} from {{user}}",
    "revoke connect on database {{database}} from {{user}}",
    "drop role if exists {{user}}",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{Bindings, render};

    #[test]
    fn test_templates_carry_no_quotes_around_placeholders() {
        let all = [CREATE_DATABASE, CREATE_OBJECTS_OWNER, GRANT_ALL_TO_OWNER, UPDATE_PASSWORD, CREATE_MANAGEMENT_ROLE, RENEW_EXPIRY]
            .into_iter()
            .chain(DEFAULT_CREATION_SQL.iter().copied())
            .chain(DEFAULT_REVOCATION_SQL.iter().copied());
        for template in all {
            assert!(!template.contains("'{{"), "{template}");
            assert!(!template.contains("\"{{"), "{template}");
        }
    }

    #[test]
    fn test_default_creation_renders() {
        let b = Bindings::new()
            .identifier("user", "app-1")
            .literal("password", "pw")
            .literal("expiration", "2030-01-01 00:00:00+0000")
            .identifier("objects_owner", "owner")
            .identifier("group", "v-manage-1");
        assert_eq!(
            render(DEFAULT_CREATION_SQL[0], &b),
            "create role \"app-1\" with login password 'pw' inherit in role \"owner\" valid until '2030-01-01 00:00:00+0000' role \"v-manage-1\""
        );
    }
}
