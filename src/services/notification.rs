//! 通知模块 - 生成发给家长的WhatsApp消息和链接
//!
//! 系统不直接调用WhatsApp接口，管理员点击生成的 wa.me 链接后手动发送。

/// 只保留手机号中的数字
pub fn clean_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// 家长访问链接，有令牌时直接指向该令牌的页面
pub fn parent_link(domain: &str, token: Option<&str>) -> String {
    let domain = domain.trim_end_matches('/');
    match token.filter(|t| !t.is_empty()) {
        Some(token) => format!("{}/veli/{}", domain, token),
        None => format!("{}/veli-otp", domain),
    }
}

/// 发给家长的消息正文
pub fn message_template(
    domain: &str,
    otp: &str,
    parent_name: Option<&str>,
    token: Option<&str>,
) -> String {
    let greeting = match parent_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Sayın {},", name),
        None => "Sayın Veli,".to_string(),
    };

    format!(
        "{greeting}\n\n\
         Ogrencinizin devamsizlik bildirimi sisteme yuklenmistir.\n\n\
         Sifre: {otp}\n\n\
         Asagidaki baglantiya tiklayarak devamsizlik mektubunu goruntuleyebilirsiniz:\n\n\
         {link}\n\n\
         * Sifre 24 saat gecerlidir.",
        greeting = greeting,
        otp = otp,
        link = parent_link(domain, token),
    )
}

/// 预填消息的 wa.me 链接
pub fn whatsapp_link(
    phone: &str,
    domain: &str,
    otp: &str,
    parent_name: Option<&str>,
    token: Option<&str>,
) -> String {
    let message = message_template(domain, otp, parent_name, token);
    format!(
        "https://wa.me/{}?text={}",
        clean_phone(phone),
        urlencoding::encode(&message)
    )
}
