//local shortcuts

//third-party shortcuts

//standard shortcuts
use std::collections::HashMap;

//-------------------------------------------------------------------------------------------------------------------

/// Injectable name/secret store consulted when authenticating connections.
///
/// Names and tokens are opaque non-empty strings, each unique within a store. Setting a record whose name or
/// token collides with an existing record displaces that record.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore
{
    /// name -> token
    by_name: HashMap<String, String>,
    /// token -> name (reverse index for token-only authentication)
    by_token: HashMap<String, String>,
}

impl CredentialStore
{
    /// Makes an empty store.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Registers a credential record, displacing any record sharing the name or the token.
    ///
    /// Re-registering an identical (name, token) pair is a no-op.
    pub fn set_user(&mut self, name: impl Into<String>, token: impl Into<String>)
    {
        let name  = name.into();
        let token = token.into();

        if self.by_name.get(&name) == Some(&token) { return; }

        if let Some(old_token) = self.by_name.remove(&name)
        {
            self.by_token.remove(&old_token);
        }
        if let Some(old_name) = self.by_token.remove(&token)
        {
            self.by_name.remove(&old_name);
        }

        self.by_name.insert(name.clone(), token.clone());
        self.by_token.insert(token, name);
    }

    /// Removes the record for `name`. Returns `false` if the name was unknown.
    pub fn remove_user(&mut self, name: &str) -> bool
    {
        let Some(token) = self.by_name.remove(name) else { return false; };
        self.by_token.remove(&token);
        true
    }

    /// Looks up the canonical name associated with `token`.
    pub fn name_for_token(&self, token: &str) -> Option<&str>
    {
        self.by_token.get(token).map(String::as_str)
    }

    /// Looks up the token registered for `name`.
    pub fn token_for(&self, name: &str) -> Option<&str>
    {
        self.by_name.get(name).map(String::as_str)
    }

    /// Tests whether `name` has a record.
    pub fn contains(&self, name: &str) -> bool
    {
        self.by_name.contains_key(name)
    }

    /// Number of records in the store.
    pub fn len(&self) -> usize
    {
        self.by_name.len()
    }

    /// Tests whether the store is empty.
    pub fn is_empty(&self) -> bool
    {
        self.by_name.is_empty()
    }
}

//-------------------------------------------------------------------------------------------------------------------
