//! Authorization gate: abilities, resource policies and before/after hooks
//!
//! An ability resolves in this order:
//! 1. `before` hooks, the first one returning `Some` decides;
//! 2. the policy registered for the resource type, if it defines the ability;
//! 3. the ability callback;
//! 4. anything undefined is denied.
//!
//! `after` hooks then see the result and may replace it.

use crate::{AuthError, AuthResult};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Authorization rules for one resource type.
///
/// Methods return `None` when the policy does not cover the ability, which
/// lets the gate fall through to plain ability callbacks.
pub trait Policy<U, R>: Send + Sync {
    /// Runs before any other method of this policy
    fn before(&self, _user: &U, _ability: &str) -> Option<bool> {
        None
    }

    fn view_any(&self, _user: &U) -> Option<bool> {
        None
    }

    fn view(&self, _user: &U, _resource: &R) -> Option<bool> {
        None
    }

    fn create(&self, _user: &U) -> Option<bool> {
        None
    }

    fn update(&self, _user: &U, _resource: &R) -> Option<bool> {
        None
    }

    fn delete(&self, _user: &U, _resource: &R) -> Option<bool> {
        None
    }

    /// Abilities other than the standard ones
    fn ability(&self, _ability: &str, _user: &U, _resource: &R) -> Option<bool> {
        None
    }
}

type AbilityFn<U> = Arc<dyn Fn(&U) -> bool + Send + Sync>;
type ResourceAbilityFn<U> = Arc<dyn Fn(&U, &dyn Any) -> Option<bool> + Send + Sync>;
type BeforeFn<U> = Arc<dyn Fn(&U, &str) -> Option<bool> + Send + Sync>;
type AfterFn<U> = Arc<dyn Fn(&U, &str, bool) -> Option<bool> + Send + Sync>;

/// `view`, `update`... out of `posts.update`
fn method_name(ability: &str) -> &str {
    ability.rsplit('.').next().unwrap_or(ability)
}

fn call_policy<U, R>(policy: &dyn Policy<U, R>, ability: &str, user: &U, resource: &R) -> Option<bool> {
    if let Some(result) = policy.before(user, ability) {
        return Some(result);
    }
    match method_name(ability) {
        "view_any" | "viewAny" => policy.view_any(user),
        "view" => policy.view(user, resource),
        "create" => policy.create(user),
        "update" => policy.update(user, resource),
        "delete" => policy.delete(user, resource),
        other => policy.ability(other, user, resource),
    }
}

pub struct Gate<U> {
    abilities: HashMap<String, AbilityFn<U>>,
    resource_abilities: HashMap<String, Vec<(TypeId, ResourceAbilityFn<U>)>>,
    policies: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    before: Vec<BeforeFn<U>>,
    after: Vec<AfterFn<U>>,
}

impl<U> Default for Gate<U> {
    fn default() -> Self {
        Self {
            abilities: HashMap::new(),
            resource_abilities: HashMap::new(),
            policies: HashMap::new(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }
}

impl<U> fmt::Debug for Gate<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("abilities", &(self.abilities.len() + self.resource_abilities.len()))
            .field("policies", &self.policies.len())
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

impl<U: 'static> Gate<U> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ability that only looks at the user
    pub fn define<F>(&mut self, ability: &str, callback: F) -> &mut Self
    where
        F: Fn(&U) -> bool + Send + Sync + 'static,
    {
        self.abilities.insert(ability.to_string(), Arc::new(callback));
        self
    }

    /// Ability checked against a resource of type `R`
    pub fn define_for<R, F>(&mut self, ability: &str, callback: F) -> &mut Self
    where
        R: 'static,
        F: Fn(&U, &R) -> bool + Send + Sync + 'static,
    {
        let erased: ResourceAbilityFn<U> = Arc::new(move |user: &U, resource: &dyn Any| {
            resource.downcast_ref::<R>().map(|r| callback(user, r))
        });
        let entries = self.resource_abilities.entry(ability.to_string()).or_default();
        entries.retain(|(type_id, _)| *type_id != TypeId::of::<R>());
        entries.push((TypeId::of::<R>(), erased));
        self
    }

    /// Policy consulted for every check against an `R`
    pub fn policy<R: 'static>(&mut self, policy: Arc<dyn Policy<U, R>>) -> &mut Self {
        self.policies.insert(TypeId::of::<R>(), Box::new(policy));
        self
    }

    /// Register `policy` for `R` and define `name.view`, `name.create`,
    /// `name.update` and `name.delete` through it
    pub fn resource<R: 'static>(&mut self, name: &str, policy: Arc<dyn Policy<U, R>>) -> &mut Self {
        for method in ["view", "update", "delete"] {
            let ability = format!("{}.{}", name, method);
            let policy = policy.clone();
            let key = ability.clone();
            self.define_for::<R, _>(&ability, move |user, resource| {
                call_policy(policy.as_ref(), &key, user, resource).unwrap_or(false)
            });
        }

        let create = format!("{}.create", name);
        let creator = policy.clone();
        let key = create.clone();
        self.define(&create, move |user| {
            creator
                .before(user, &key)
                .or_else(|| creator.create(user))
                .unwrap_or(false)
        });

        self.policy(policy)
    }

    pub fn before<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&U, &str) -> Option<bool> + Send + Sync + 'static,
    {
        self.before.push(Arc::new(callback));
        self
    }

    pub fn after<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&U, &str, bool) -> Option<bool> + Send + Sync + 'static,
    {
        self.after.push(Arc::new(callback));
        self
    }

    pub fn has(&self, ability: &str) -> bool {
        self.abilities.contains_key(ability) || self.resource_abilities.contains_key(ability)
    }

    /// Names of every defined ability, sorted
    pub fn abilities(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .abilities
            .keys()
            .chain(self.resource_abilities.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn run_before(&self, user: &U, ability: &str) -> Option<bool> {
        self.before.iter().find_map(|hook| hook(user, ability))
    }

    fn run_after(&self, user: &U, ability: &str, mut result: bool) -> bool {
        for hook in &self.after {
            if let Some(overridden) = hook(user, ability, result) {
                result = overridden;
            }
        }
        if !result {
            tracing::debug!(ability = %ability, "Gate denied ability");
        }
        result
    }

    pub fn allows(&self, user: &U, ability: &str) -> bool {
        let result = self
            .run_before(user, ability)
            .or_else(|| self.abilities.get(ability).map(|callback| callback(user)))
            .unwrap_or(false);
        self.run_after(user, ability, result)
    }

    pub fn allows_for<R: 'static>(&self, user: &U, ability: &str, resource: &R) -> bool {
        let result = self
            .run_before(user, ability)
            .or_else(|| self.policy_result(user, ability, resource))
            .or_else(|| self.resource_ability_result(user, ability, resource))
            .or_else(|| self.abilities.get(ability).map(|callback| callback(user)))
            .unwrap_or(false);
        self.run_after(user, ability, result)
    }

    fn policy_result<R: 'static>(&self, user: &U, ability: &str, resource: &R) -> Option<bool> {
        let policy = self
            .policies
            .get(&TypeId::of::<R>())?
            .downcast_ref::<Arc<dyn Policy<U, R>>>()?;
        call_policy(policy.as_ref(), ability, user, resource)
    }

    fn resource_ability_result<R: 'static>(&self, user: &U, ability: &str, resource: &R) -> Option<bool> {
        self.resource_abilities
            .get(ability)?
            .iter()
            .find(|(type_id, _)| *type_id == TypeId::of::<R>())
            .and_then(|(_, callback)| callback(user, resource as &dyn Any))
    }

    pub fn denies(&self, user: &U, ability: &str) -> bool {
        !self.allows(user, ability)
    }

    pub fn denies_for<R: 'static>(&self, user: &U, ability: &str, resource: &R) -> bool {
        !self.allows_for(user, ability, resource)
    }

    /// Every ability is allowed
    pub fn check(&self, user: &U, abilities: &[&str]) -> bool {
        abilities.iter().all(|ability| self.allows(user, ability))
    }

    /// At least one ability is allowed
    pub fn any(&self, user: &U, abilities: &[&str]) -> bool {
        abilities.iter().any(|ability| self.allows(user, ability))
    }

    pub fn authorize(&self, user: &U, ability: &str) -> AuthResult<()> {
        if self.allows(user, ability) {
            Ok(())
        } else {
            Err(AuthError::access_denied("This action is unauthorized."))
        }
    }

    pub fn authorize_for<R: 'static>(&self, user: &U, ability: &str, resource: &R) -> AuthResult<()> {
        if self.allows_for(user, ability, resource) {
            Ok(())
        } else {
            Err(AuthError::access_denied("This action is unauthorized."))
        }
    }

    /// Checks bound to one user
    pub fn for_user<'a>(&'a self, user: &'a U) -> UserGate<'a, U> {
        UserGate { gate: self, user }
    }
}

/// A gate with the user already chosen
pub struct UserGate<'a, U> {
    gate: &'a Gate<U>,
    user: &'a U,
}

impl<'a, U: 'static> UserGate<'a, U> {
    pub fn allows(&self, ability: &str) -> bool {
        self.gate.allows(self.user, ability)
    }

    pub fn allows_for<R: 'static>(&self, ability: &str, resource: &R) -> bool {
        self.gate.allows_for(self.user, ability, resource)
    }

    pub fn denies(&self, ability: &str) -> bool {
        self.gate.denies(self.user, ability)
    }

    pub fn check(&self, abilities: &[&str]) -> bool {
        self.gate.check(self.user, abilities)
    }

    pub fn any(&self, abilities: &[&str]) -> bool {
        self.gate.any(self.user, abilities)
    }

    pub fn authorize(&self, ability: &str) -> AuthResult<()> {
        self.gate.authorize(self.user, ability)
    }

    /// Abilities this user holds, for handing to views
    pub fn allowed_abilities(&self) -> Vec<String> {
        self.gate
            .abilities()
            .into_iter()
            .filter(|ability| self.gate.allows(self.user, ability))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct User {
        id: i64,
        admin: bool,
        banned: bool,
    }

    struct Post {
        author_id: i64,
        locked: bool,
    }

    struct PostPolicy;

    impl Policy<User, Post> for PostPolicy {
        fn before(&self, user: &User, _ability: &str) -> Option<bool> {
            user.admin.then_some(true)
        }

        fn view(&self, _user: &User, _post: &Post) -> Option<bool> {
            Some(true)
        }

        fn create(&self, user: &User) -> Option<bool> {
            Some(!user.banned)
        }

        fn update(&self, user: &User, post: &Post) -> Option<bool> {
            Some(user.id == post.author_id && !post.locked)
        }

        fn ability(&self, ability: &str, user: &User, post: &Post) -> Option<bool> {
            match ability {
                "publish" => Some(user.id == post.author_id),
                _ => None,
            }
        }
    }

    fn user(id: i64) -> User {
        User {
            id,
            admin: false,
            banned: false,
        }
    }

    fn post(author_id: i64) -> Post {
        Post {
            author_id,
            locked: false,
        }
    }

    #[test]
    fn test_undefined_ability_is_denied() {
        let gate: Gate<User> = Gate::new();
        assert!(gate.denies(&user(1), "anything"));
        assert!(gate.denies_for(&user(1), "update", &post(1)));
        assert!(matches!(
            gate.authorize(&user(1), "anything"),
            Err(AuthError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_define_and_define_for() {
        let mut gate = Gate::new();
        gate.define("view-dashboard", |u: &User| u.admin)
            .define_for("edit-post", |u: &User, p: &Post| u.id == p.author_id);

        let admin = User {
            admin: true,
            ..user(9)
        };
        assert!(gate.allows(&admin, "view-dashboard"));
        assert!(gate.denies(&user(1), "view-dashboard"));
        assert!(gate.allows_for(&user(1), "edit-post", &post(1)));
        assert!(!gate.allows_for(&user(2), "edit-post", &post(1)));
        // a resource ability needs its resource
        assert!(gate.denies(&user(1), "edit-post"));

        assert!(gate.has("edit-post"));
        assert_eq!(gate.abilities(), vec!["edit-post", "view-dashboard"]);
    }

    #[test]
    fn test_resource_policy() {
        let mut gate = Gate::new();
        gate.resource::<Post>("posts", Arc::new(PostPolicy));

        assert!(gate.allows_for(&user(1), "posts.update", &post(1)));
        assert!(gate.denies_for(&user(2), "posts.update", &post(1)));
        assert!(gate.denies_for(&user(1), "posts.update", &Post { author_id: 1, locked: true }));
        assert!(gate.allows_for(&user(2), "posts.view", &post(1)));
        // delete is not covered by the policy
        assert!(gate.denies_for(&user(1), "posts.delete", &post(1)));
        assert!(gate.allows(&user(1), "posts.create"));
        assert!(gate.denies(&User { banned: true, ..user(1) }, "posts.create"));

        // the policy's own before
        let admin = User { admin: true, ..user(5) };
        assert!(gate.allows_for(&admin, "posts.delete", &post(1)));

        // custom policy ability
        assert!(gate.allows_for(&user(1), "publish", &post(1)));
    }

    #[test]
    fn test_policy_takes_precedence_over_callback() {
        let mut gate = Gate::new();
        gate.define_for("update", |_u: &User, _p: &Post| true)
            .policy::<Post>(Arc::new(PostPolicy));
        assert!(gate.denies_for(&user(2), "update", &post(1)));
        // delete is not defined by the policy, the callback is not defined either
        assert!(gate.denies_for(&user(2), "delete", &post(1)));
    }

    #[test]
    fn test_before_and_after_hooks() {
        let mut gate = Gate::new();
        gate.define("publish", |_u: &User| true)
            .before(|u: &User, _ability| u.banned.then_some(false))
            .before(|u: &User, _ability| u.admin.then_some(true))
            .after(|u: &User, ability, result| (ability == "publish" && u.id == 13).then_some(!result));

        let banned_admin = User { id: 1, admin: true, banned: true };
        assert!(gate.denies(&banned_admin, "publish"));
        assert!(gate.allows(&User { admin: true, ..user(2) }, "undefined"));
        assert!(gate.allows(&user(1), "publish"));
        assert!(gate.denies(&user(13), "publish"));
    }

    #[test]
    fn test_check_any_and_for_user() {
        let mut gate = Gate::new();
        gate.define("a", |_u: &User| true).define("b", |_u: &User| false);

        let u = user(1);
        assert!(gate.check(&u, &["a"]));
        assert!(!gate.check(&u, &["a", "b"]));
        assert!(gate.any(&u, &["a", "b"]));
        assert!(!gate.any(&u, &["b", "c"]));

        let scoped = gate.for_user(&u);
        assert!(scoped.allows("a"));
        assert!(scoped.denies("b"));
        assert!(scoped.authorize("b").is_err());
        assert_eq!(scoped.allowed_abilities(), vec!["a"]);
    }
}
