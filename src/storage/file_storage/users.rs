use std::collections::BTreeMap;

use tracing::debug;

use super::FileStorage;

use crate::errors::{AutograderError, Result};
use crate::models::{
    tokens::entities::{Token, TokenSource},
    users::entities::ServerUser,
};
use crate::utils::{
    normalize_email,
    password::{generate_salt, hash_token_blocking},
    read_json_file, write_json_file,
};

type UserMap = BTreeMap<String, ServerUser>;

impl FileStorage {
    fn load_users(&self) -> Result<UserMap> {
        Ok(read_json_file::<UserMap>(&self.users_path())?.unwrap_or_default())
    }

    fn write_users(&self, users: &UserMap) -> Result<()> {
        write_json_file(&self.users_path(), users)
    }

    /// 列出所有服务器用户
    pub async fn get_server_users_impl(&self) -> Result<UserMap> {
        let _guard = self.users_lock.lock().await;
        self.load_users()
    }

    /// 通过邮箱获取用户
    pub async fn get_server_user_impl(&self, email: &str) -> Result<Option<ServerUser>> {
        let email = normalize_email(email);
        let _guard = self.users_lock.lock().await;
        Ok(self.load_users()?.remove(&email))
    }

    /// 插入或合并用户，整体写回 users.json
    pub async fn upsert_users_impl(&self, users: Vec<ServerUser>) -> Result<()> {
        let _guard = self.users_lock.lock().await;
        let mut all = self.load_users()?;

        for mut user in users {
            user.validate()?;

            let merged = match all.remove(&user.email) {
                Some(mut existing) => {
                    existing.merge(user);
                    existing.validate()?;
                    existing
                }
                None => user,
            };
            all.insert(merged.email.clone(), merged);
        }

        self.write_users(&all)
    }

    /// 删除用户
    pub async fn delete_user_impl(&self, email: &str) -> Result<bool> {
        let email = normalize_email(email);
        let _guard = self.users_lock.lock().await;

        let mut all = self.load_users()?;
        if all.remove(&email).is_none() {
            return Ok(false);
        }

        self.write_users(&all)?;
        Ok(true)
    }

    /// 为用户创建令牌；用户还没有盐时先生成并写回
    ///
    /// 同一 `(source, name, 明文)` 已存在时返回已保存的令牌。
    pub async fn add_token_impl(
        &self,
        email: &str,
        cleartext: &str,
        source: TokenSource,
        name: &str,
    ) -> Result<Option<Token>> {
        let email = normalize_email(email);

        let salt = {
            let _guard = self.users_lock.lock().await;
            let mut all = self.load_users()?;
            let Some(user) = all.get_mut(&email) else {
                return Ok(None);
            };

            match &user.salt {
                Some(salt) => salt.clone(),
                None => {
                    let salt = generate_salt();
                    user.salt = Some(salt.clone());
                    self.write_users(&all)?;
                    salt
                }
            }
        };

        let digest = hash_token_blocking(cleartext, &salt).await?;
        let token = Token::from_digest(digest, source, name);

        let _guard = self.users_lock.lock().await;
        let mut all = self.load_users()?;
        let Some(user) = all.get_mut(&email) else {
            return Ok(None);
        };
        if user.salt.as_deref() != Some(salt.as_str()) {
            return Err(AutograderError::storage(format!(
                "用户 '{email}' 的盐在创建令牌期间发生变化"
            )));
        }

        if let Some(existing) = user.tokens.iter().find(|t| **t == token) {
            debug!("用户 '{}' 已有相同令牌 {}", email, existing.id);
            return Ok(Some(existing.clone()));
        }

        user.tokens.push(token.clone());
        user.tokens.sort();

        self.write_users(&all)?;
        Ok(Some(token))
    }

    /// 吊销令牌
    pub async fn remove_token_impl(&self, email: &str, token_id: &str) -> Result<bool> {
        let email = normalize_email(email);
        let _guard = self.users_lock.lock().await;

        let mut all = self.load_users()?;
        let Some(user) = all.get_mut(&email) else {
            return Ok(false);
        };

        let before = user.tokens.len();
        user.tokens.retain(|token| token.id != token_id);
        if user.tokens.len() == before {
            return Ok(false);
        }

        self.write_users(&all)?;
        Ok(true)
    }

    /// 校验用户令牌，成功时写回令牌的访问时间
    ///
    /// 每次认证只在用户盐上计算一次摘要，再逐个做常数时间比较；哈希期间不持有用户锁。
    pub async fn authenticate_user_impl(
        &self,
        email: &str,
        cleartext: &str,
    ) -> Result<Option<ServerUser>> {
        if cleartext.is_empty() {
            return Ok(None);
        }
        let email = normalize_email(email);

        let salt = {
            let _guard = self.users_lock.lock().await;
            match self.load_users()?.remove(&email) {
                Some(ServerUser {
                    salt: Some(salt),
                    tokens,
                    ..
                }) if !tokens.is_empty() => salt,
                _ => return Ok(None),
            }
        };

        let digest = hash_token_blocking(cleartext, &salt).await?;

        let _guard = self.users_lock.lock().await;
        let mut all = self.load_users()?;
        let Some(user) = all.get_mut(&email) else {
            return Ok(None);
        };
        if user.salt.as_deref() != Some(salt.as_str()) || !user.touch_token(&digest) {
            return Ok(None);
        }

        let user = user.clone();
        self.write_users(&all)?;
        Ok(Some(user))
    }
}
