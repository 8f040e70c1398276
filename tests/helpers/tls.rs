use boring::pkey::PKey;
use boring::ssl::{select_next_proto, AlpnError, SslAcceptor, SslAcceptorBuilder, SslMethod};
use boring::x509::X509;

/// Acceptor builder holding a fresh self-signed certificate for
/// 127.0.0.1/localhost, and that certificate's PEM for the client's trust
/// store.
pub fn generate_cert_bundle() -> (SslAcceptorBuilder, Vec<u8>) {
    let generated =
        rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string(), "localhost".to_string()])
            .unwrap();
    let root_pem = generated.cert.pem();
    let key = PKey::private_key_from_pem(generated.signing_key.serialize_pem().as_bytes()).unwrap();
    let cert = X509::from_pem(root_pem.as_bytes()).unwrap();

    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    builder.set_private_key(&key).unwrap();
    builder.set_certificate(&cert).unwrap();
    (builder, root_pem.into_bytes())
}

/// Acceptor that picks `server_protos` (ALPN wire format, e.g. `b"\x02h2"`)
/// when the client offers it, plus the root PEM.
pub fn acceptor_with_alpn(server_protos: &'static [u8]) -> (SslAcceptor, Vec<u8>) {
    let (mut builder, root) = generate_cert_bundle();
    builder.set_alpn_select_callback(move |_, client_protos| {
        select_next_proto(server_protos, client_protos).ok_or(AlpnError::NOACK)
    });
    (builder.build(), root)
}
