//! Governance: proposals, deposits, votes and parameter changes.
//!
//! A proposal collects deposits until it reaches the minimum deposit, then
//! enters its voting period. At the end of the voting period the gov end
//! blocker tallies stake-weighted votes. Passing parameter-change proposals
//! are checked against the [`ParamRegistry`] and written into the parameter
//! store.
//!
//! The `gov` parameter subspace also carries the service and arbitration
//! parameters; [`param_table`] declares all of them.

use std::sync::Arc;

use hub_store::{Context, StoreKey};
use hub_types::tags::keys;
use hub_types::{fraction_exceeds, AccAddress, Coins, Ratio, Tags};
use serde::{Deserialize, Serialize};

use crate::bank::BankKeeper;
use crate::error::{codespace, ModuleError, ModuleResult};
use crate::handler::{handler_fn, json_response, querier_fn, Handler, HandlerResult, Querier};
use crate::keeper::{Keeper, ValidateGenesis};
use crate::msg::Msg;
use crate::params::{any_value, ParamRegistry, ParamTable, ParamsKeeper, Subspace};
use crate::stake::{StakeKeeper, POWER_REDUCTION};
use crate::{arbitration, service};

pub const PARAM_SPACE: &str = "gov";
pub const DEPOSIT_PROCEDURE_KEY: &str = "depositProcedure";
pub const VOTING_PROCEDURE_KEY: &str = "votingProcedure";
pub const TALLYING_PROCEDURE_KEY: &str = "tallyingProcedure";

pub const CODE_UNKNOWN_PROPOSAL: u32 = 1;
pub const CODE_INACTIVE_PROPOSAL: u32 = 2;
pub const CODE_INVALID_CONTENT: u32 = 3;
pub const CODE_INVALID_PARAMS: u32 = 4;

const MAX_TITLE_LENGTH: usize = 140;
const MAX_DESCRIPTION_LENGTH: usize = 5000;

const NEXT_PROPOSAL_ID_KEY: &[u8] = b"newProposalID";
const PROPOSAL_PREFIX: &[u8] = b"proposals/";
const DEPOSIT_PREFIX: &[u8] = b"deposits/";
const VOTE_PREFIX: &[u8] = b"votes/";

fn proposal_key(id: u64) -> Vec<u8> {
    [PROPOSAL_PREFIX, id.to_be_bytes().as_slice()].concat()
}

fn deposits_prefix(id: u64) -> Vec<u8> {
    [DEPOSIT_PREFIX, id.to_be_bytes().as_slice()].concat()
}

fn deposit_key(id: u64, depositor: &AccAddress) -> Vec<u8> {
    [deposits_prefix(id).as_slice(), depositor.as_bytes().as_slice()].concat()
}

fn votes_prefix(id: u64) -> Vec<u8> {
    [VOTE_PREFIX, id.to_be_bytes().as_slice()].concat()
}

fn vote_key(id: u64, voter: &AccAddress) -> Vec<u8> {
    [votes_prefix(id).as_slice(), voter.as_bytes().as_slice()].concat()
}

fn gov_error(code: u32, reason: impl Into<String>) -> ModuleError {
    ModuleError::rejected(codespace::GOV, code, reason)
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositProcedure {
    pub min_deposit: Coins,
    /// Seconds a proposal may wait for its minimum deposit.
    pub max_deposit_period: u64,
}

impl Default for DepositProcedure {
    fn default() -> Self {
        Self {
            min_deposit: Coins::single(crate::auth::DEFAULT_FEE_TOKEN, 1000 * POWER_REDUCTION),
            max_deposit_period: 24 * 3600,
        }
    }
}

impl DepositProcedure {
    pub fn validate(&self) -> Result<(), String> {
        self.min_deposit.validate().map_err(|e| e.to_string())?;
        if self.max_deposit_period == 0 {
            return Err("max_deposit_period must be positive".into());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingProcedure {
    /// Seconds of voting once the deposit is met.
    pub voting_period: u64,
}

impl Default for VotingProcedure {
    fn default() -> Self {
        Self {
            voting_period: 24 * 3600,
        }
    }
}

impl VotingProcedure {
    pub fn validate(&self) -> Result<(), String> {
        if self.voting_period == 0 {
            return Err("voting_period must be positive".into());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyingProcedure {
    pub threshold: Ratio,
    pub veto: Ratio,
    pub participation: Ratio,
}

impl Default for TallyingProcedure {
    fn default() -> Self {
        Self {
            threshold: Ratio::new(1, 2),
            veto: Ratio::new(1, 3),
            participation: Ratio::new(2, 3),
        }
    }
}

impl TallyingProcedure {
    pub fn validate(&self) -> Result<(), String> {
        for ratio in [&self.threshold, &self.veto, &self.participation] {
            ratio.validate_fraction().map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

/// Declaration of the `gov` parameter subspace, including the service and
/// arbitration entries stored there.
pub fn param_table() -> ParamTable {
    ParamTable::new(PARAM_SPACE)
        .param::<DepositProcedure>(DEPOSIT_PROCEDURE_KEY, true, DepositProcedure::validate)
        .param::<VotingProcedure>(VOTING_PROCEDURE_KEY, true, VotingProcedure::validate)
        .param::<TallyingProcedure>(TALLYING_PROCEDURE_KEY, true, TallyingProcedure::validate)
        .param::<u64>(service::MAX_REQUEST_TIMEOUT_KEY, true, service::validate_max_request_timeout)
        .param::<u64>(service::MIN_DEPOSIT_MULTIPLE_KEY, true, service::validate_min_deposit_multiple)
        .param::<u64>(arbitration::COMPLAINT_RETROSPECT_KEY, false, any_value)
        .param::<u64>(arbitration::ARBITRATION_TIMELIMIT_KEY, false, any_value)
}

// ---------------------------------------------------------------------------
// Proposals
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamChange {
    pub subspace: String,
    pub key: String,
    /// JSON-encoded new value.
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalContent {
    Text {
        title: String,
        description: String,
    },
    ParameterChange {
        title: String,
        description: String,
        changes: Vec<ParamChange>,
    },
}

impl ProposalContent {
    pub fn title(&self) -> &str {
        match self {
            Self::Text { title, .. } | Self::ParameterChange { title, .. } => title,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Text { description, .. } | Self::ParameterChange { description, .. } => description,
        }
    }

    pub fn validate_basic(&self) -> ModuleResult<()> {
        let title = self.title().trim();
        if title.is_empty() || title.len() > MAX_TITLE_LENGTH {
            return Err(gov_error(
                CODE_INVALID_CONTENT,
                format!("title must be 1-{MAX_TITLE_LENGTH} characters"),
            ));
        }
        if self.description().len() > MAX_DESCRIPTION_LENGTH {
            return Err(gov_error(
                CODE_INVALID_CONTENT,
                format!("description exceeds {MAX_DESCRIPTION_LENGTH} characters"),
            ));
        }
        if let Self::ParameterChange { changes, .. } = self {
            if changes.is_empty() {
                return Err(gov_error(CODE_INVALID_CONTENT, "parameter change proposal without changes"));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    DepositPeriod,
    VotingPeriod,
    Passed,
    Rejected,
    /// Passed, but applying the content failed.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOption {
    Yes,
    Abstain,
    No,
    NoWithVeto,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyResult {
    pub yes: u128,
    pub abstain: u128,
    pub no: u128,
    pub no_with_veto: u128,
}

impl TallyResult {
    pub fn total(&self) -> u128 {
        self.yes + self.abstain + self.no + self.no_with_veto
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub content: ProposalContent,
    pub status: ProposalStatus,
    pub submit_time: u64,
    pub deposit_end_time: u64,
    pub total_deposit: Coins,
    pub voting_start_time: Option<u64>,
    pub voting_end_time: Option<u64>,
    pub final_tally: Option<TallyResult>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub proposal_id: u64,
    pub depositor: AccAddress,
    pub amount: Coins,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: u64,
    pub voter: AccAddress,
    pub option: VoteOption,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSubmitProposal {
    pub proposer: AccAddress,
    pub content: ProposalContent,
    pub initial_deposit: Coins,
}

impl MsgSubmitProposal {
    pub fn validate_basic(&self) -> ModuleResult<()> {
        self.content.validate_basic()?;
        self.initial_deposit
            .validate()
            .map_err(|e| ModuleError::InvalidCoins(e.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDeposit {
    pub proposal_id: u64,
    pub depositor: AccAddress,
    pub amount: Coins,
}

impl MsgDeposit {
    pub fn validate_basic(&self) -> ModuleResult<()> {
        self.amount
            .validate()
            .map_err(|e| ModuleError::InvalidCoins(e.to_string()))?;
        if self.amount.is_empty() {
            return Err(ModuleError::InvalidCoins("deposit must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgVote {
    pub proposal_id: u64,
    pub voter: AccAddress,
    pub option: VoteOption,
}

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovGenesis {
    pub starting_proposal_id: u64,
    pub deposit_procedure: DepositProcedure,
    pub voting_procedure: VotingProcedure,
    pub tallying_procedure: TallyingProcedure,
    pub proposals: Vec<Proposal>,
    pub deposits: Vec<Deposit>,
    pub votes: Vec<Vote>,
}

impl Default for GovGenesis {
    fn default() -> Self {
        Self {
            starting_proposal_id: 1,
            deposit_procedure: DepositProcedure::default(),
            voting_procedure: VotingProcedure::default(),
            tallying_procedure: TallyingProcedure::default(),
            proposals: Vec::new(),
            deposits: Vec::new(),
            votes: Vec::new(),
        }
    }
}

impl ValidateGenesis for GovGenesis {
    fn validate(&self) -> ModuleResult<()> {
        let invalid = |e: String| gov_error(CODE_INVALID_PARAMS, e);
        self.deposit_procedure.validate().map_err(invalid)?;
        self.voting_procedure.validate().map_err(invalid)?;
        self.tallying_procedure.validate().map_err(invalid)?;
        if self.starting_proposal_id == 0 {
            return Err(invalid("starting_proposal_id must be positive".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Keeper
// ---------------------------------------------------------------------------

pub struct GovKeeper {
    key: StoreKey,
    bank: Arc<BankKeeper>,
    stake: Arc<StakeKeeper>,
    params: Subspace,
    params_keeper: ParamsKeeper,
    registry: Arc<ParamRegistry>,
}

impl GovKeeper {
    pub fn new(
        key: StoreKey,
        bank: Arc<BankKeeper>,
        stake: Arc<StakeKeeper>,
        params_keeper: ParamsKeeper,
        registry: Arc<ParamRegistry>,
    ) -> Self {
        Self {
            key,
            bank,
            stake,
            params: params_keeper.subspace(PARAM_SPACE),
            params_keeper,
            registry,
        }
    }

    pub fn deposit_procedure(&self, ctx: &Context<'_>) -> ModuleResult<DepositProcedure> {
        self.params.get_or(ctx, DEPOSIT_PROCEDURE_KEY, DepositProcedure::default())
    }

    pub fn voting_procedure(&self, ctx: &Context<'_>) -> ModuleResult<VotingProcedure> {
        self.params.get_or(ctx, VOTING_PROCEDURE_KEY, VotingProcedure::default())
    }

    pub fn tallying_procedure(&self, ctx: &Context<'_>) -> ModuleResult<TallyingProcedure> {
        self.params.get_or(ctx, TALLYING_PROCEDURE_KEY, TallyingProcedure::default())
    }

    pub fn get_proposal(&self, ctx: &Context<'_>, id: u64) -> ModuleResult<Option<Proposal>> {
        Ok(ctx.get_value(&self.key, &proposal_key(id))?)
    }

    fn require_proposal(&self, ctx: &Context<'_>, id: u64) -> ModuleResult<Proposal> {
        self.get_proposal(ctx, id)?
            .ok_or_else(|| gov_error(CODE_UNKNOWN_PROPOSAL, format!("unknown proposal {id}")))
    }

    fn set_proposal(&self, ctx: &mut Context<'_>, proposal: &Proposal) -> ModuleResult<()> {
        Ok(ctx.set_value(&self.key, &proposal_key(proposal.id), proposal)?)
    }

    pub fn proposals(&self, ctx: &Context<'_>) -> ModuleResult<Vec<Proposal>> {
        Ok(ctx
            .scan_values::<Proposal>(&self.key, PROPOSAL_PREFIX)?
            .into_iter()
            .map(|(_, p)| p)
            .collect())
    }

    pub fn deposits(&self, ctx: &Context<'_>, id: u64) -> ModuleResult<Vec<Deposit>> {
        Ok(ctx
            .scan_values::<Deposit>(&self.key, &deposits_prefix(id))?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }

    pub fn votes(&self, ctx: &Context<'_>, id: u64) -> ModuleResult<Vec<Vote>> {
        Ok(ctx
            .scan_values::<Vote>(&self.key, &votes_prefix(id))?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    fn next_proposal_id(&self, ctx: &Context<'_>) -> ModuleResult<u64> {
        Ok(ctx.get_value(&self.key, NEXT_PROPOSAL_ID_KEY)?.unwrap_or(1))
    }

    pub fn submit_proposal(
        &self,
        ctx: &mut Context<'_>,
        proposer: AccAddress,
        content: ProposalContent,
        initial_deposit: &Coins,
    ) -> ModuleResult<u64> {
        if let ProposalContent::ParameterChange { changes, .. } = &content {
            for change in changes {
                self.registry
                    .validate_change(&change.subspace, &change.key, &change.value)?;
            }
        }
        let id = self.next_proposal_id(ctx)?;
        ctx.set_value(&self.key, NEXT_PROPOSAL_ID_KEY, &(id + 1))?;
        let now = ctx.block_time();
        let proposal = Proposal {
            id,
            content,
            status: ProposalStatus::DepositPeriod,
            submit_time: now,
            deposit_end_time: now + self.deposit_procedure(ctx)?.max_deposit_period,
            total_deposit: Coins::empty(),
            voting_start_time: None,
            voting_end_time: None,
            final_tally: None,
        };
        self.set_proposal(ctx, &proposal)?;
        tracing::info!(proposal = id, proposer = %proposer, "proposal submitted");
        if !initial_deposit.is_empty() {
            self.add_deposit(ctx, id, proposer, initial_deposit)?;
        }
        Ok(id)
    }

    /// Returns `true` if this deposit started the voting period.
    pub fn add_deposit(
        &self,
        ctx: &mut Context<'_>,
        id: u64,
        depositor: AccAddress,
        amount: &Coins,
    ) -> ModuleResult<bool> {
        let mut proposal = self.require_proposal(ctx, id)?;
        if !matches!(
            proposal.status,
            ProposalStatus::DepositPeriod | ProposalStatus::VotingPeriod
        ) {
            return Err(gov_error(CODE_INACTIVE_PROPOSAL, format!("proposal {id} is closed")));
        }
        self.bank.subtract_coins(ctx, &depositor, amount)?;
        let key = deposit_key(id, &depositor);
        let previous = ctx
            .get_value::<Deposit>(&self.key, &key)?
            .map(|d| d.amount)
            .unwrap_or_default();
        let deposit = Deposit {
            proposal_id: id,
            depositor,
            amount: previous.plus(amount),
        };
        ctx.set_value(&self.key, &key, &deposit)?;

        proposal.total_deposit = proposal.total_deposit.plus(amount);
        let activated = proposal.status == ProposalStatus::DepositPeriod
            && proposal
                .total_deposit
                .is_all_gte(&self.deposit_procedure(ctx)?.min_deposit);
        if activated {
            let now = ctx.block_time();
            proposal.status = ProposalStatus::VotingPeriod;
            proposal.voting_start_time = Some(now);
            proposal.voting_end_time = Some(now + self.voting_procedure(ctx)?.voting_period);
            tracing::info!(proposal = id, "proposal entered voting period");
        }
        self.set_proposal(ctx, &proposal)?;
        Ok(activated)
    }

    pub fn add_vote(&self, ctx: &mut Context<'_>, id: u64, voter: AccAddress, option: VoteOption) -> ModuleResult<()> {
        let proposal = self.require_proposal(ctx, id)?;
        if proposal.status != ProposalStatus::VotingPeriod {
            return Err(gov_error(
                CODE_INACTIVE_PROPOSAL,
                format!("proposal {id} is not in its voting period"),
            ));
        }
        let vote = Vote {
            proposal_id: id,
            voter,
            option,
        };
        Ok(ctx.set_value(&self.key, &vote_key(id, &voter), &vote)?)
    }

    /// Bonded tokens a voter controls through its delegations.
    fn voting_power(&self, ctx: &Context<'_>, voter: &AccAddress) -> ModuleResult<u128> {
        let mut power = 0u128;
        for delegation in self.stake.delegations(ctx)? {
            if delegation.delegator != *voter {
                continue;
            }
            if let Some(validator) = self.stake.get_validator(ctx, &delegation.validator)? {
                if validator.is_bonded() && !validator.jailed {
                    power = power.saturating_add(validator.tokens_for_shares(delegation.shares));
                }
            }
        }
        Ok(power)
    }

    pub fn tally(&self, ctx: &Context<'_>, id: u64) -> ModuleResult<TallyResult> {
        let mut result = TallyResult::default();
        for vote in self.votes(ctx, id)? {
            let power = self.voting_power(ctx, &vote.voter)?;
            let bucket = match vote.option {
                VoteOption::Yes => &mut result.yes,
                VoteOption::Abstain => &mut result.abstain,
                VoteOption::No => &mut result.no,
                VoteOption::NoWithVeto => &mut result.no_with_veto,
            };
            *bucket = bucket.saturating_add(power);
        }
        Ok(result)
    }

    /// Outcome of a tally as `(passed, burn_deposits)`.
    fn outcome(&self, ctx: &Context<'_>, tally: &TallyResult) -> ModuleResult<(bool, bool)> {
        let procedure = self.tallying_procedure(ctx)?;
        let bonded = self.stake.total_bonded_tokens(ctx)?;
        let voted = tally.total();
        let p = &procedure.participation;
        if bonded == 0
            || voted.saturating_mul(p.denominator as u128) < bonded.saturating_mul(p.numerator as u128)
        {
            return Ok((false, false));
        }
        if fraction_exceeds(tally.no_with_veto, voted, &procedure.veto) {
            return Ok((false, true));
        }
        let non_abstain = voted - tally.abstain;
        Ok((fraction_exceeds(tally.yes, non_abstain, &procedure.threshold), false))
    }

    fn refund_deposits(&self, ctx: &mut Context<'_>, id: u64) -> ModuleResult<()> {
        for deposit in self.deposits(ctx, id)? {
            self.bank.add_coins(ctx, &deposit.depositor, &deposit.amount)?;
            ctx.delete(&self.key, &deposit_key(id, &deposit.depositor))?;
        }
        Ok(())
    }

    fn burn_deposits(&self, ctx: &mut Context<'_>, id: u64) -> ModuleResult<()> {
        for deposit in self.deposits(ctx, id)? {
            ctx.delete(&self.key, &deposit_key(id, &deposit.depositor))?;
        }
        Ok(())
    }

    fn execute(&self, ctx: &mut Context<'_>, content: &ProposalContent) -> ModuleResult<()> {
        let ProposalContent::ParameterChange { changes, .. } = content else {
            return Ok(());
        };
        ctx.branch(|branch| {
            for change in changes {
                self.registry
                    .validate_change(&change.subspace, &change.key, &change.value)?;
                self.params_keeper.set_raw(
                    branch,
                    &change.subspace,
                    &change.key,
                    change.value.clone().into_bytes(),
                )?;
                tracing::info!(subspace = %change.subspace, key = %change.key, "parameter changed by governance");
            }
            Ok(())
        })
    }
}

impl Keeper for GovKeeper {
    type Genesis = GovGenesis;

    fn module_name(&self) -> &'static str {
        "gov"
    }

    fn init_genesis(&self, ctx: &mut Context<'_>, state: &GovGenesis) -> ModuleResult<()> {
        ctx.set_value(&self.key, NEXT_PROPOSAL_ID_KEY, &state.starting_proposal_id)?;
        self.params.set(ctx, DEPOSIT_PROCEDURE_KEY, &state.deposit_procedure)?;
        self.params.set(ctx, VOTING_PROCEDURE_KEY, &state.voting_procedure)?;
        self.params.set(ctx, TALLYING_PROCEDURE_KEY, &state.tallying_procedure)?;
        for proposal in &state.proposals {
            self.set_proposal(ctx, proposal)?;
        }
        for deposit in &state.deposits {
            ctx.set_value(&self.key, &deposit_key(deposit.proposal_id, &deposit.depositor), deposit)?;
        }
        for vote in &state.votes {
            ctx.set_value(&self.key, &vote_key(vote.proposal_id, &vote.voter), vote)?;
        }
        Ok(())
    }

    fn export_genesis(&self, ctx: &Context<'_>) -> ModuleResult<GovGenesis> {
        let proposals = self.proposals(ctx)?;
        let mut deposits = Vec::new();
        let mut votes = Vec::new();
        for proposal in &proposals {
            deposits.extend(self.deposits(ctx, proposal.id)?);
            votes.extend(self.votes(ctx, proposal.id)?);
        }
        Ok(GovGenesis {
            starting_proposal_id: self.next_proposal_id(ctx)?,
            deposit_procedure: self.deposit_procedure(ctx)?,
            voting_procedure: self.voting_procedure(ctx)?,
            tallying_procedure: self.tallying_procedure(ctx)?,
            proposals,
            deposits,
            votes,
        })
    }
}

pub fn new_handler(keeper: Arc<GovKeeper>) -> Handler {
    handler_fn(move |ctx, msg| match msg {
        Msg::SubmitProposal(m) => {
            let id = keeper.submit_proposal(ctx, m.proposer, m.content.clone(), &m.initial_deposit)?;
            Ok(HandlerResult {
                tags: Tags::new().with(keys::PROPOSAL_ID, id),
                log: format!("proposal {id} submitted"),
            })
        }
        Msg::Deposit(m) => {
            let activated = keeper.add_deposit(ctx, m.proposal_id, m.depositor, &m.amount)?;
            let mut tags = Tags::new()
                .with(keys::PROPOSAL_ID, m.proposal_id)
                .with("depositor", m.depositor);
            if activated {
                tags.push("voting-period-start", m.proposal_id);
            }
            Ok(HandlerResult::with_tags(tags))
        }
        Msg::Vote(m) => {
            keeper.add_vote(ctx, m.proposal_id, m.voter, m.option)?;
            Ok(HandlerResult::with_tags(
                Tags::new()
                    .with(keys::PROPOSAL_ID, m.proposal_id)
                    .with("voter", m.voter),
            ))
        }
        other => Err(ModuleError::UnknownRequest(format!(
            "gov cannot handle {}",
            other.kind()
        ))),
    })
}

fn parse_id(raw: &str) -> ModuleResult<u64> {
    raw.parse()
        .map_err(|_| gov_error(CODE_UNKNOWN_PROPOSAL, format!("invalid proposal id {raw:?}")))
}

/// Query paths: `proposal/<id>`, `proposals`, `deposits/<id>`, `votes/<id>`,
/// `tally/<id>`, `params`.
pub fn new_querier(keeper: Arc<GovKeeper>) -> Querier {
    querier_fn(move |ctx, path, _data| match path {
        ["proposal", id] => json_response(&keeper.require_proposal(ctx, parse_id(id)?)?),
        ["proposals"] => json_response(&keeper.proposals(ctx)?),
        ["deposits", id] => json_response(&keeper.deposits(ctx, parse_id(id)?)?),
        ["votes", id] => json_response(&keeper.votes(ctx, parse_id(id)?)?),
        ["tally", id] => {
            let id = parse_id(id)?;
            let proposal = keeper.require_proposal(ctx, id)?;
            match proposal.final_tally {
                Some(tally) => json_response(&tally),
                None => json_response(&keeper.tally(ctx, id)?),
            }
        }
        ["params"] => json_response(&(
            keeper.deposit_procedure(ctx)?,
            keeper.voting_procedure(ctx)?,
            keeper.tallying_procedure(ctx)?,
        )),
        _ => Err(ModuleError::UnknownRequest(format!(
            "unknown gov query {}",
            path.join("/")
        ))),
    })
}

/// Drop expired deposit-period proposals and close finished votes.
pub fn end_blocker(ctx: &mut Context<'_>, keeper: &GovKeeper) -> ModuleResult<Tags> {
    let now = ctx.block_time();
    let mut tags = Tags::new();
    for mut proposal in keeper.proposals(ctx)? {
        match proposal.status {
            ProposalStatus::DepositPeriod if proposal.deposit_end_time <= now => {
                keeper.burn_deposits(ctx, proposal.id)?;
                ctx.delete(&keeper.key, &proposal_key(proposal.id))?;
                tracing::info!(proposal = proposal.id, "proposal dropped: minimum deposit not reached");
                tags.push(keys::PROPOSAL_ID, proposal.id);
                tags.push(keys::PROPOSAL_RESULT, "dropped");
            }
            ProposalStatus::VotingPeriod if proposal.voting_end_time.is_some_and(|end| end <= now) => {
                let tally = keeper.tally(ctx, proposal.id)?;
                let (passed, burn) = keeper.outcome(ctx, &tally)?;
                if burn {
                    keeper.burn_deposits(ctx, proposal.id)?;
                } else {
                    keeper.refund_deposits(ctx, proposal.id)?;
                }
                proposal.status = if !passed {
                    ProposalStatus::Rejected
                } else {
                    match keeper.execute(ctx, &proposal.content) {
                        Ok(()) => ProposalStatus::Passed,
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            tracing::warn!(proposal = proposal.id, error = %e, "passed proposal failed to apply");
                            ProposalStatus::Failed
                        }
                    }
                };
                proposal.final_tally = Some(tally);
                keeper.set_proposal(ctx, &proposal)?;
                let result = match proposal.status {
                    ProposalStatus::Passed => "passed",
                    ProposalStatus::Failed => "failed",
                    _ => "rejected",
                };
                tracing::info!(proposal = proposal.id, result, "voting period ended");
                tags.push(keys::PROPOSAL_ID, proposal.id);
                tags.push(keys::PROPOSAL_RESULT, result);
            }
            _ => {}
        }
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use hub_store::{CommitMultiStore, StoreKeyRegistry};
    use hub_types::{BlockHeader, Coin, PubKey};

    use super::*;
    use crate::auth::AccountKeeper;

    struct Fixture {
        store: CommitMultiStore,
        bank: Arc<BankKeeper>,
        stake: Arc<StakeKeeper>,
        gov: Arc<GovKeeper>,
        params: ParamsKeeper,
        voter: AccAddress,
    }

    fn fixture() -> Fixture {
        let mut keys = StoreKeyRegistry::new();
        let acc = keys.register("acc").unwrap();
        let params = keys.register("params").unwrap();
        let tparams = keys.register_transient("transient_params").unwrap();
        let stake_key = keys.register("stake").unwrap();
        let gov_key = keys.register("gov").unwrap();
        let params_keeper = ParamsKeeper::new(params, tparams);
        let registry = Arc::new(ParamRegistry::new());
        registry.register(param_table()).unwrap();
        let bank = Arc::new(BankKeeper::new(Arc::new(AccountKeeper::new(acc))));
        let stake = Arc::new(StakeKeeper::new(
            stake_key,
            Arc::clone(&bank),
            params_keeper.subspace(crate::stake::PARAM_SPACE),
        ));
        let gov = Arc::new(GovKeeper::new(
            gov_key,
            Arc::clone(&bank),
            Arc::clone(&stake),
            params_keeper.clone(),
            registry,
        ));
        let mut store = CommitMultiStore::mount(&keys);
        let voter = AccAddress::from_pubkey(&PubKey::from_bytes([1; 32]));
        {
            let mut ctx = Context::new(&mut store, BlockHeader::default());
            gov.init_genesis(&mut ctx, &GovGenesis::default()).unwrap();
            let bond = Coin::new("airis", 100 * POWER_REDUCTION);
            bank.add_coins(&mut ctx, &voter, &Coins::new([bond.clone(), Coin::new("airis", 5000 * POWER_REDUCTION)]))
                .unwrap();
            stake
                .create_validator(&mut ctx, voter.into(), PubKey::from_bytes([2; 32]), "v", voter, &bond)
                .unwrap();
            stake.apply_and_return_validator_set_updates(&mut ctx).unwrap();
        }
        Fixture {
            store,
            bank,
            stake,
            gov,
            params: params_keeper,
            voter,
        }
    }

    fn at(time: u64) -> BlockHeader {
        BlockHeader {
            height: 1,
            time,
            ..BlockHeader::default()
        }
    }

    fn timeout_change(value: &str) -> ProposalContent {
        ProposalContent::ParameterChange {
            title: "raise timeout".into(),
            description: String::new(),
            changes: vec![ParamChange {
                subspace: PARAM_SPACE.into(),
                key: service::MAX_REQUEST_TIMEOUT_KEY.into(),
                value: value.into(),
            }],
        }
    }

    #[test]
    fn parameter_change_passes_and_applies() {
        let mut fx = fixture();
        let min_deposit = DepositProcedure::default().min_deposit;
        let mut ctx = Context::new(&mut fx.store, at(10));
        let id = fx
            .gov
            .submit_proposal(&mut ctx, fx.voter, timeout_change("250"), &min_deposit)
            .unwrap();
        assert_eq!(fx.gov.get_proposal(&ctx, id).unwrap().unwrap().status, ProposalStatus::VotingPeriod);
        fx.gov.add_vote(&mut ctx, id, fx.voter, VoteOption::Yes).unwrap();
        let balance_before = fx.bank.get_coins(&ctx, &fx.voter).unwrap();
        drop(ctx);

        let mut ctx = Context::new(&mut fx.store, at(10 + VotingProcedure::default().voting_period));
        let tags = end_blocker(&mut ctx, &fx.gov).unwrap();
        assert_eq!(tags.get(keys::PROPOSAL_RESULT), Some("passed"));
        let raw = fx.params.get_raw(&ctx, PARAM_SPACE, service::MAX_REQUEST_TIMEOUT_KEY).unwrap();
        assert_eq!(raw, Some(b"250".to_vec()));
        assert_eq!(
            fx.bank.get_coins(&ctx, &fx.voter).unwrap(),
            balance_before.plus(&min_deposit)
        );
        let tally = fx.gov.get_proposal(&ctx, id).unwrap().unwrap().final_tally.unwrap();
        assert_eq!(tally.yes, 100 * POWER_REDUCTION);
    }

    #[test]
    fn ungovernable_change_rejected_at_submission() {
        let mut fx = fixture();
        let mut ctx = Context::new(&mut fx.store, at(10));
        let content = ProposalContent::ParameterChange {
            title: "shorten retrospect".into(),
            description: String::new(),
            changes: vec![ParamChange {
                subspace: PARAM_SPACE.into(),
                key: arbitration::COMPLAINT_RETROSPECT_KEY.into(),
                value: "1".into(),
            }],
        };
        let err = fx
            .gov
            .submit_proposal(&mut ctx, fx.voter, content, &Coins::empty())
            .unwrap_err();
        assert_eq!(err.codespace(), codespace::PARAMS);
    }

    #[test]
    fn veto_burns_deposit() {
        let mut fx = fixture();
        let min_deposit = DepositProcedure::default().min_deposit;
        let mut ctx = Context::new(&mut fx.store, at(10));
        let content = ProposalContent::Text {
            title: "t".into(),
            description: "d".into(),
        };
        let id = fx.gov.submit_proposal(&mut ctx, fx.voter, content, &min_deposit).unwrap();
        fx.gov.add_vote(&mut ctx, id, fx.voter, VoteOption::NoWithVeto).unwrap();
        let balance_before = fx.bank.get_coins(&ctx, &fx.voter).unwrap();
        drop(ctx);

        let mut ctx = Context::new(&mut fx.store, at(10 + VotingProcedure::default().voting_period));
        let tags = end_blocker(&mut ctx, &fx.gov).unwrap();
        assert_eq!(tags.get(keys::PROPOSAL_RESULT), Some("rejected"));
        assert_eq!(fx.bank.get_coins(&ctx, &fx.voter).unwrap(), balance_before);
        assert!(fx.gov.deposits(&ctx, id).unwrap().is_empty());
    }

    #[test]
    fn underfunded_proposal_is_dropped() {
        let mut fx = fixture();
        let mut ctx = Context::new(&mut fx.store, at(0));
        let content = ProposalContent::Text {
            title: "t".into(),
            description: String::new(),
        };
        let id = fx
            .gov
            .submit_proposal(&mut ctx, fx.voter, content, &Coins::single("airis", 1))
            .unwrap();
        assert!(fx.gov.add_vote(&mut ctx, id, fx.voter, VoteOption::Yes).is_err());
        drop(ctx);
        let mut ctx = Context::new(&mut fx.store, at(DepositProcedure::default().max_deposit_period));
        let tags = end_blocker(&mut ctx, &fx.gov).unwrap();
        assert_eq!(tags.get(keys::PROPOSAL_RESULT), Some("dropped"));
        assert!(fx.gov.get_proposal(&ctx, id).unwrap().is_none());
        assert!(fx.stake.validators(&ctx).unwrap().len() == 1);
    }

    #[test]
    fn genesis_export_round_trips() {
        let mut fx = fixture();
        let mut ctx = Context::new(&mut fx.store, at(0));
        let content = ProposalContent::Text {
            title: "t".into(),
            description: String::new(),
        };
        fx.gov
            .submit_proposal(&mut ctx, fx.voter, content, &Coins::single("airis", 1))
            .unwrap();
        let exported = fx.gov.export_genesis(&ctx).unwrap();
        assert_eq!(exported.starting_proposal_id, 2);
        assert_eq!(exported.deposits.len(), 1);
        fx.gov.init_genesis(&mut ctx, &exported).unwrap();
        assert_eq!(fx.gov.export_genesis(&ctx).unwrap(), exported);
    }
}
