//! Quotes domain module (event-sourced).
//!
//! A quote is the negotiation document between one seller and one buyer.
//! Counter-offers bounce it between `SELLER_REVIEW` and `BUYER_REVIEW` until
//! one side accepts, either side rejects, or the time-to-live elapses.

pub mod item;
pub mod quote;

pub use item::{LineUpdate, QuoteItem, subtotal};
pub use quote::{
    AcceptQuote, CounterOffer, CreateQuote, ExpireQuote, LinkOrder, Quote, QuoteAccepted,
    QuoteCommand, QuoteCounterOffered, QuoteCreated, QuoteEvent, QuoteExpired, QuoteId,
    QuoteOrderLinked, QuoteRejected, QuoteStatus, QuoteSubmitted, Rejection, RejectQuote,
    SellerReviewStarted, SubmissionGates, SubmitQuote,
};
