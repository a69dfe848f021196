pub mod rtcp;
