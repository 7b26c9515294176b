//! Procurement workflow preset
//!
//! The fixed pipeline this crate was built to run: a planner delegates a
//! real-time query to a chain of specialists that discover the paid search
//! service, authenticate against it, inspect the issued tokens, estimate the
//! query cost, issue a payment token, execute the query, and settle the
//! charge before control returns to the planner.
//!
//! Each step is an [`AgentRole`] with its capability set and handoff edges;
//! nothing here subclasses an agent type. The graph only builds against a
//! [`ToolInvoker`] that registers every capability named below.

use crate::error::Result;
use crate::graph::{AgentGraph, AgentRole};
use crate::invoker::ToolInvoker;

pub const PLANNER: &str = "planner";
pub const SELLER_FINDER: &str = "seller_finder";
pub const KYA_ISSUER: &str = "kya_issuer";
pub const TOKEN_INSPECTOR: &str = "token_inspector";
pub const CONNECTOR: &str = "connector";
pub const PRICE_ESTIMATOR: &str = "price_estimator";
pub const PAYMENT_ISSUER: &str = "payment_issuer";
pub const SEARCHER: &str = "searcher";
pub const SETTLEMENT: &str = "settlement";

/// Build the nine-role procurement pipeline.
pub fn procurement_graph(invoker: &ToolInvoker) -> Result<AgentGraph> {
    AgentGraph::builder()
        .role(
            AgentRole::new(PLANNER)
                .entry()
                .terminal()
                .instructions(
                    "You plan the workflow. Answer general questions directly and finish. \
                     For queries needing live data, transfer to the seller finder. \
                     When the settlement agent returns with results, verify them, \
                     summarize for the user, and finish.",
                )
                .handoff_to(SELLER_FINDER),
        )
        .role(
            AgentRole::new(SELLER_FINDER)
                .instructions(
                    "Find the seller offering the search service the query needs, \
                     then transfer to the KYA issuer with the seller's service id.",
                )
                .capability("find-sellers")
                .handoff_to(KYA_ISSUER),
        )
        .role(
            AgentRole::new(KYA_ISSUER)
                .instructions(
                    "Create a KYA token identifying this buyer to the seller's service, \
                     then transfer to the token inspector.",
                )
                .capability("create-kya-token")
                .handoff_to(TOKEN_INSPECTOR),
        )
        .role(
            AgentRole::new(TOKEN_INSPECTOR)
                .instructions(
                    "Decode the most recent token and report its type and claims. \
                     After a KYA token, transfer to the connector; after a payment \
                     token, transfer to the searcher.",
                )
                .capability("decode-jwt")
                .handoff_to(CONNECTOR)
                .handoff_to(SEARCHER),
        )
        .role(
            AgentRole::new(CONNECTOR)
                .instructions(
                    "Connect to the seller's service with the KYA token, fetch the \
                     resource and pricing catalog, reconcile free versus paid tools, \
                     then transfer to the price estimator.",
                )
                .capability("connect-mcp")
                .capability("get-service-pricing")
                .handoff_to(PRICE_ESTIMATOR),
        )
        .role(
            AgentRole::new(PRICE_ESTIMATOR)
                .instructions(
                    "Estimate the cost of answering the user's query from the pricing \
                     catalog, including expected call counts, then transfer to the \
                     payment issuer with the estimate.",
                )
                .capability("calculate-query-price")
                .handoff_to(PAYMENT_ISSUER),
        )
        .role(
            AgentRole::new(PAYMENT_ISSUER)
                .instructions(
                    "Create a combined KYA and payment token funded with the estimated \
                     amount, then transfer to the token inspector for verification.",
                )
                .capability("create-kya-payment-token")
                .handoff_to(TOKEN_INSPECTOR),
        )
        .role(
            AgentRole::new(SEARCHER)
                .instructions(
                    "Execute the user's query against the paid search service using \
                     the payment token, then transfer to settlement with the results \
                     and the token.",
                )
                .capability("real-time-search")
                .handoff_to(SETTLEMENT),
        )
        .role(
            AgentRole::new(SETTLEMENT)
                .instructions(
                    "Charge the payment token for the actual usage and transfer back \
                     to the planner with the results and the charge receipt.",
                )
                .capability("charge-token")
                .handoff_to(PLANNER),
        )
        .build(invoker)
}
