use async_trait::async_trait;
use std::sync::Arc;

use crate::core::domain::entity::user::user::UnvalidatedCreateUserInput;
use crate::core::domain::entity::user::{User, UserCommand, USERS_TABLE};
use crate::core::domain::execution_setting::ExecutionSetting;
use crate::core::domain::option_supplier::MultipleListSupplier;
use crate::core::domain::transaction::TransactionWrapper;
use crate::core::domain::transaction_manager::TransactionManager;
use crate::core::domain::transaction_operation::{TransactionAction, TransactionOperationError};
use crate::core::domain::transaction_option::{TransactionOption, TransactionOptionError};

use crate::core::port::create_user::{
    CreateUserError, CreateUserInputBoundary, CreateUserOutputBoundary,
};

pub struct InsertUserOperation {
    user: User,
    user_repository: Arc<dyn UserCommand>,
}

impl InsertUserOperation {
    pub fn new(user: User, user_repository: Arc<dyn UserCommand>) -> Self {
        Self {
            user,
            user_repository,
        }
    }
}

#[async_trait]
impl TransactionAction<()> for InsertUserOperation {
    async fn execute(
        &self,
        transaction: &mut Box<dyn TransactionWrapper>,
    ) -> Result<(), TransactionOperationError> {
        self.user_repository.insert(transaction, &self.user).await?;
        Ok(())
    }
}

pub struct CreateUserUseCase {
    repository: Arc<dyn UserCommand>,
    transaction_manager: Arc<TransactionManager>,
    setting: ExecutionSetting,
}

impl CreateUserUseCase {
    pub fn new(
        repository: Arc<dyn UserCommand>,
        transaction_manager: Arc<TransactionManager>,
        setting: ExecutionSetting,
    ) -> Self {
        Self {
            repository,
            transaction_manager,
            setting,
        }
    }

    /// Optimistic attempts first, then one long transaction that preserves
    /// the users table so it cannot lose to the same conflict again.
    pub fn default_setting(optimistic_attempts: usize) -> Result<ExecutionSetting, TransactionOptionError> {
        let supplier = MultipleListSupplier::new()
            .add(TransactionOption::occ(), optimistic_attempts)
            .add(TransactionOption::ltx([USERS_TABLE])?, 1);
        Ok(ExecutionSetting::multiple(supplier).with_transaction_label("create_user"))
    }
}

#[async_trait]
impl CreateUserInputBoundary for CreateUserUseCase {
    async fn execute(
        &self,
        input: UnvalidatedCreateUserInput,
        output_boundary: &mut dyn CreateUserOutputBoundary,
    ) -> Result<(), CreateUserError> {
        let user = User::try_from(input)?;
        let id = user.id;
        let operation = InsertUserOperation::new(user, self.repository.clone());
        self.transaction_manager
            .run(&self.setting, &operation)
            .await?;

        output_boundary.execute(id)?;

        Ok(())
    }
}
