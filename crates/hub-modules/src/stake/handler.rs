use std::sync::Arc;

use hub_store::Context;
use hub_types::tags::keys;
use hub_types::{Tags, ValidatorUpdate};

use super::StakeKeeper;
use crate::error::{ModuleError, ModuleResult};
use crate::handler::{handler_fn, Handler, HandlerResult};
use crate::msg::Msg;

pub fn new_handler(keeper: Arc<StakeKeeper>) -> Handler {
    handler_fn(move |ctx, msg| match msg {
        Msg::CreateValidator(m) => {
            keeper.create_validator(ctx, m.validator, m.pub_key, &m.moniker, m.delegator, &m.amount)?;
            Ok(HandlerResult::with_tags(
                Tags::new()
                    .with(keys::VALIDATOR, m.validator)
                    .with("moniker", &m.moniker),
            ))
        }
        Msg::Delegate(m) => {
            keeper.delegate(ctx, m.delegator, &m.amount, m.validator)?;
            Ok(HandlerResult::with_tags(
                Tags::new()
                    .with(keys::DELEGATOR, m.delegator)
                    .with(keys::VALIDATOR, m.validator),
            ))
        }
        Msg::BeginUnbonding(m) => {
            let completion = keeper.begin_unbonding(ctx, m.delegator, m.validator, m.shares)?;
            Ok(HandlerResult {
                tags: Tags::new()
                    .with(keys::DELEGATOR, m.delegator)
                    .with(keys::VALIDATOR, m.validator)
                    .with("end-time", completion),
                log: format!("unbonding completes at {completion}"),
            })
        }
        other => Err(ModuleError::UnknownRequest(format!(
            "stake cannot handle {}",
            other.kind()
        ))),
    })
}

/// Pay out matured unbondings, then recompute the bonded set.
pub fn end_blocker(ctx: &mut Context<'_>, keeper: &StakeKeeper) -> ModuleResult<(Vec<ValidatorUpdate>, Tags)> {
    let mut tags = Tags::new();
    for ubd in keeper.complete_unbondings(ctx)? {
        tags.push(keys::ACTION, "complete_unbonding");
        tags.push(keys::DELEGATOR, ubd.delegator);
        tags.push(keys::VALIDATOR, ubd.validator);
    }
    let updates = keeper.apply_and_return_validator_set_updates(ctx)?;
    Ok((updates, tags))
}
