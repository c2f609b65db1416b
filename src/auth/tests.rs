use super::*;

const SECRET: &str = "supersecretjwtsecretforunittesting123";

#[test]
fn test_mint_and_validate_token() {
    let user_id = Uuid::parse_str("123e4567-e89b-12d3-a456-426614174000").unwrap();
    let token = mint_token(SECRET, 3600, user_id, "test@example.com", "admin").unwrap();

    let claims = validate_token(SECRET, &token).expect("Valid token should pass");
    assert_eq!(claims.sub, user_id.to_string());
    assert_eq!(claims.role, "admin");
    assert_eq!(claims.email.as_deref(), Some("test@example.com"));
}

#[test]
fn test_validate_token_expired() {
    let claims = Claims {
        sub: "123e4567-e89b-12d3-a456-426614174000".to_string(),
        role: "user".to_string(),
        email: None,
        exp: 1, // past
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    assert!(validate_token(SECRET, &token).is_err());
}

#[test]
fn test_validate_token_wrong_secret() {
    let user_id = Uuid::new_v4();
    let token = mint_token("wrongsecret", 3600, user_id, "test@example.com", "user").unwrap();

    assert!(validate_token(SECRET, &token).is_err());
}

#[test]
fn test_password_hash_round_trip() {
    let hash = hash_password("correct-horse-battery-staple").unwrap();
    assert!(verify_password("correct-horse-battery-staple", &hash));
    assert!(!verify_password("wrong-password", &hash));
}

#[test]
fn test_generated_passwords_are_distinct() {
    let a = generate_password();
    let b = generate_password();
    assert_eq!(a.len(), 14);
    assert_ne!(a, b);
}
