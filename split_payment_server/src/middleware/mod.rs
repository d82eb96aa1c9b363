mod signature;

pub use signature::{
    SignatureCheck,
    SignatureMiddlewareFactory,
    SignatureMiddlewareService,
    SignatureScheme,
    BANK_SIGNATURE_HEADER,
    STRIPE_SIGNATURE_HEADER,
};
